//!
//! JSON-RPC client for an Ethereum-style node.
//!
//! This module provides an async client for historical log queries, contract
//! calls, and transaction submission with inclusion waiting. All methods are
//! async and designed for use with Tokio. The typed event sources and contract
//! handles built on top of it implement the seams consumed by the ledger
//! synchronizer and the donation workflow engine.

use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::chain::contracts::{
	decode_decimals_result, decode_donation_received, decode_eth_donation, donation_received_topic,
	encode_approve, encode_decimals, encode_donate, eth_donation_topic, parse_quantity,
};
use crate::chain::types::{BlockTag, ChainError, LogEntry, RawEvent};
use crate::ledger::fetcher::{ChainReader, EventSource, TokenMetadata};
use crate::workflow::engine::{DonationContract, TokenContract, WalletClient};

/// How often the inclusion wait polls for a receipt.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// How many receipt polls before an inclusion wait gives up.
const RECEIPT_POLL_ATTEMPTS: u32 = 60;

/// Client for a JSON-RPC node endpoint
#[derive(Clone)]
pub struct EthRpcClient {
	/// The underlying HTTP client for RPC requests.
	http_client: Client,
	/// The HTTP endpoint for JSON-RPC requests.
	rpc_url: String,
	/// The WebSocket endpoint for log subscriptions.
	ws_url: String,
	/// Account used as `from` for submitted transactions, if the node does
	/// not have a default unlocked account.
	sender: Option<Address>,
}

impl EthRpcClient {
	/// Create a new node client.
	pub fn new(rpc_url: String, ws_url: String) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			rpc_url,
			ws_url,
			sender: None,
		}
	}

	/// Set the account used as `from` on submitted transactions.
	pub fn with_sender(mut self, sender: Address) -> Self {
		self.sender = Some(sender);
		self
	}

	/// The WebSocket endpoint this client was configured with.
	pub fn ws_url(&self) -> &str {
		&self.ws_url
	}

	/// Typed event source for the donation manager's `DonationReceived` log.
	pub fn ledger_source(&self, address: Address) -> LedgerEventSource {
		LedgerEventSource {
			client: self.clone(),
			address,
		}
	}

	/// Typed event source for the charity wallet's `ETHDonation` log.
	pub fn native_source(&self, address: Address) -> NativeEventSource {
		NativeEventSource {
			client: self.clone(),
			address,
		}
	}

	/// Handle for the donation manager's `donate` entry point.
	pub fn donation_manager(&self, address: Address) -> DonationManagerContract {
		DonationManagerContract {
			client: self.clone(),
			address,
		}
	}

	/// Execute a JSON-RPC request and return its `result` value.
	async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": method,
			"params": params,
		});

		let response = self
			.http_client
			.post(&self.rpc_url)
			.json(&request_body)
			.send()
			.await
			.map_err(map_transport_error)?;

		if !response.status().is_success() {
			return Err(ChainError::SourceUnavailable(format!(
				"HTTP error from node: {}",
				response.status()
			)));
		}

		let body: Value = response.json().await.map_err(map_transport_error)?;

		if let Some(error) = body.get("error") {
			let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
			let message = error
				.get("message")
				.and_then(Value::as_str)
				.unwrap_or("unknown RPC error")
				.to_string();
			return Err(classify_rpc_error(code, message));
		}

		body.get("result")
			.cloned()
			.ok_or_else(|| ChainError::Rpc {
				code: 0,
				message: "response missing result field".to_string(),
			})
	}

	/// Current block height via `eth_blockNumber`.
	pub async fn block_number(&self) -> Result<u64, ChainError> {
		let result = self.request("eth_blockNumber", json!([])).await?;
		let quantity = result.as_str().ok_or_else(|| {
			ChainError::Decode("eth_blockNumber returned a non-string result".to_string())
		})?;
		parse_quantity(quantity)
	}

	/// Historical logs for one contract and topic over `[from, to]`.
	pub async fn get_logs(
		&self,
		address: Address,
		topic0: B256,
		from_block: u64,
		to_block: BlockTag,
	) -> Result<Vec<LogEntry>, ChainError> {
		let filter = json!({
			"address": format!("{address}"),
			"topics": [format!("0x{}", hex::encode(topic0))],
			"fromBlock": BlockTag::Number(from_block).to_param(),
			"toBlock": to_block.to_param(),
		});

		let result = self.request("eth_getLogs", json!([filter])).await?;
		let logs: Vec<LogEntry> = serde_json::from_value(result)?;
		debug!(
			"Fetched {} logs for {} from block {}",
			logs.len(),
			address,
			from_block
		);
		Ok(logs)
	}

	/// Read-only contract call via `eth_call`.
	pub async fn call(&self, to: Address, data: Vec<u8>) -> Result<String, ChainError> {
		let call = json!({
			"to": format!("{to}"),
			"data": format!("0x{}", hex::encode(data)),
		});
		let result = self.request("eth_call", json!([call, "latest"])).await?;
		result
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| ChainError::Decode("eth_call returned a non-string result".to_string()))
	}

	/// Submit a transaction via `eth_sendTransaction`, returning its hash.
	///
	/// Signing is delegated to the node's wallet session; this core does not
	/// manage keys.
	pub async fn send_transaction(
		&self,
		to: Address,
		value: U256,
		data: Vec<u8>,
	) -> Result<String, ChainError> {
		let mut tx = json!({
			"to": format!("{to}"),
		});
		if let Some(sender) = self.sender {
			tx["from"] = json!(format!("{sender}"));
		}
		if value > U256::ZERO {
			tx["value"] = json!(format!("0x{value:x}"));
		}
		if !data.is_empty() {
			tx["data"] = json!(format!("0x{}", hex::encode(data)));
		}

		let result = self.request("eth_sendTransaction", json!([tx])).await?;
		let tx_hash = result.as_str().ok_or_else(|| {
			ChainError::Decode("eth_sendTransaction returned a non-string result".to_string())
		})?;
		debug!("Submitted transaction {}", tx_hash);
		Ok(tx_hash.to_string())
	}

	/// Poll for the transaction receipt until the transaction is included.
	///
	/// A reverted transaction or an exhausted poll budget both terminate with
	/// [`ChainError::NotIncluded`]; no retry is attempted.
	pub async fn wait_for_receipt(&self, tx_hash: &str) -> Result<(), ChainError> {
		for _ in 0..RECEIPT_POLL_ATTEMPTS {
			let result = self
				.request("eth_getTransactionReceipt", json!([tx_hash]))
				.await?;

			if !result.is_null() {
				let status = result.get("status").and_then(Value::as_str).unwrap_or("0x1");
				if status == "0x1" {
					debug!("Transaction {} included", tx_hash);
					return Ok(());
				}
				return Err(ChainError::NotIncluded(format!(
					"transaction {tx_hash} reverted"
				)));
			}

			tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
		}

		Err(ChainError::NotIncluded(format!(
			"timed out waiting for transaction {tx_hash}"
		)))
	}
}

fn map_transport_error(error: reqwest::Error) -> ChainError {
	if error.is_connect() || error.is_timeout() || error.is_request() {
		ChainError::SourceUnavailable(error.to_string())
	} else {
		ChainError::Http(error)
	}
}

/// Sort node-side filter rejections out from other RPC failures.
fn classify_rpc_error(code: i64, message: String) -> ChainError {
	let lowered = message.to_lowercase();
	if code == -32005
		|| lowered.contains("range")
		|| lowered.contains("too many results")
		|| lowered.contains("limit exceeded")
	{
		ChainError::RangeTooLarge(message)
	} else {
		ChainError::Rpc { code, message }
	}
}

/// Event source for `DonationReceived` logs of the donation manager
#[derive(Clone)]
pub struct LedgerEventSource {
	client: EthRpcClient,
	address: Address,
}

#[async_trait::async_trait]
impl EventSource for LedgerEventSource {
	async fn fetch_range(
		&self,
		from_block: u64,
		to_block: BlockTag,
	) -> Result<Vec<RawEvent>, ChainError> {
		let logs = self
			.client
			.get_logs(self.address, donation_received_topic(), from_block, to_block)
			.await?;
		logs.iter().map(decode_donation_received).collect()
	}

	fn source_id(&self) -> Address {
		self.address
	}
}

/// Event source for `ETHDonation` logs of the charity wallet
#[derive(Clone)]
pub struct NativeEventSource {
	client: EthRpcClient,
	address: Address,
}

#[async_trait::async_trait]
impl EventSource for NativeEventSource {
	async fn fetch_range(
		&self,
		from_block: u64,
		to_block: BlockTag,
	) -> Result<Vec<RawEvent>, ChainError> {
		let logs = self
			.client
			.get_logs(self.address, eth_donation_topic(), from_block, to_block)
			.await?;
		logs.iter().map(decode_eth_donation).collect()
	}

	fn source_id(&self) -> Address {
		self.address
	}
}

/// Handle for the donation manager's `donate` entry point
#[derive(Clone)]
pub struct DonationManagerContract {
	client: EthRpcClient,
	address: Address,
}

#[async_trait::async_trait]
impl DonationContract for DonationManagerContract {
	async fn donate(
		&self,
		token: Address,
		amount: U256,
		campaign_id: u64,
	) -> Result<String, ChainError> {
		self.client
			.send_transaction(self.address, U256::ZERO, encode_donate(token, amount, campaign_id))
			.await
	}

	async fn wait_for_inclusion(&self, tx_hash: &str) -> Result<(), ChainError> {
		self.client.wait_for_receipt(tx_hash).await
	}
}

#[async_trait::async_trait]
impl ChainReader for EthRpcClient {
	async fn block_number(&self) -> Result<u64, ChainError> {
		EthRpcClient::block_number(self).await
	}
}

#[async_trait::async_trait]
impl TokenMetadata for EthRpcClient {
	async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
		let result = self.call(token, encode_decimals()).await?;
		decode_decimals_result(&result)
	}
}

#[async_trait::async_trait]
impl WalletClient for EthRpcClient {
	async fn transfer_native(&self, to: Address, value: U256) -> Result<String, ChainError> {
		self.send_transaction(to, value, Vec::new()).await
	}

	async fn wait_for_inclusion(&self, tx_hash: &str) -> Result<(), ChainError> {
		self.wait_for_receipt(tx_hash).await
	}
}

#[async_trait::async_trait]
impl TokenContract for EthRpcClient {
	async fn decimals(&self, token: Address) -> Result<u8, ChainError> {
		self.token_decimals(token).await
	}

	async fn approve(
		&self,
		token: Address,
		spender: Address,
		amount: U256,
	) -> Result<String, ChainError> {
		self.send_transaction(token, U256::ZERO, encode_approve(spender, amount))
			.await
	}

	async fn wait_for_inclusion(&self, tx_hash: &str) -> Result<(), ChainError> {
		self.wait_for_receipt(tx_hash).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn range_rejections_are_classified() {
		assert!(matches!(
			classify_rpc_error(-32005, "query exceeds max results".to_string()),
			ChainError::RangeTooLarge(_)
		));
		assert!(matches!(
			classify_rpc_error(-32602, "block range is too wide".to_string()),
			ChainError::RangeTooLarge(_)
		));
		assert!(matches!(
			classify_rpc_error(-32000, "execution reverted".to_string()),
			ChainError::Rpc { .. }
		));
	}
}
