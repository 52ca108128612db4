//! ABI encoding and log decoding for the donation contracts.
//!
//! Covers the three on-chain surfaces the core talks to: the donation manager
//! (`donate` + `DonationReceived`), the charity wallet (`ETHDonation`), and
//! ERC-20 tokens (`approve` + `decimals`). Only the handful of entry points
//! the core needs are encoded here, word by word, rather than pulling in a
//! full ABI code generator.

use alloy_primitives::{Address, B256, U256, keccak256};

use crate::chain::types::{ChainError, LogEntry, RawEvent};

/// Topic hash for `DonationReceived(address,address,uint256,uint256,uint256)`.
pub fn donation_received_topic() -> B256 {
	keccak256(b"DonationReceived(address,address,uint256,uint256,uint256)")
}

/// Topic hash for `ETHDonation(address,uint256,uint256)`.
pub fn eth_donation_topic() -> B256 {
	keccak256(b"ETHDonation(address,uint256,uint256)")
}

fn selector(signature: &str) -> [u8; 4] {
	let hash = keccak256(signature.as_bytes());
	[hash[0], hash[1], hash[2], hash[3]]
}

fn push_address_word(out: &mut Vec<u8>, address: Address) {
	out.extend_from_slice(&[0u8; 12]);
	out.extend_from_slice(address.as_slice());
}

fn push_u256_word(out: &mut Vec<u8>, value: U256) {
	out.extend_from_slice(&value.to_be_bytes::<32>());
}

/// Calldata for `approve(address,uint256)`.
pub fn encode_approve(spender: Address, amount: U256) -> Vec<u8> {
	let mut data = selector("approve(address,uint256)").to_vec();
	push_address_word(&mut data, spender);
	push_u256_word(&mut data, amount);
	data
}

/// Calldata for `donate(address,uint256,uint256)`.
pub fn encode_donate(token: Address, amount: U256, campaign_id: u64) -> Vec<u8> {
	let mut data = selector("donate(address,uint256,uint256)").to_vec();
	push_address_word(&mut data, token);
	push_u256_word(&mut data, amount);
	push_u256_word(&mut data, U256::from(campaign_id));
	data
}

/// Calldata for `decimals()`.
pub fn encode_decimals() -> Vec<u8> {
	selector("decimals()").to_vec()
}

/// Strip an optional `0x` prefix and hex-decode.
pub fn hex_bytes(value: &str) -> Result<Vec<u8>, ChainError> {
	let stripped = value.strip_prefix("0x").unwrap_or(value);
	hex::decode(stripped).map_err(|e| ChainError::Decode(format!("invalid hex {value:?}: {e}")))
}

/// Parse a JSON-RPC hex quantity (`0x1a2b`) into a u64.
pub fn parse_quantity(value: &str) -> Result<u64, ChainError> {
	let stripped = value.strip_prefix("0x").unwrap_or(value);
	u64::from_str_radix(stripped, 16)
		.map_err(|e| ChainError::Decode(format!("invalid quantity {value:?}: {e}")))
}

fn address_from_topic(topic: &str) -> Result<Address, ChainError> {
	let bytes = hex_bytes(topic)?;
	if bytes.len() != 32 {
		return Err(ChainError::Decode(format!(
			"expected 32-byte topic, got {} bytes",
			bytes.len()
		)));
	}
	Ok(Address::from_slice(&bytes[12..]))
}

fn data_word(data: &[u8], index: usize) -> Result<[u8; 32], ChainError> {
	let start = index * 32;
	let end = start + 32;
	if data.len() < end {
		return Err(ChainError::Decode(format!(
			"event data too short: want word {index}, have {} bytes",
			data.len()
		)));
	}
	let mut word = [0u8; 32];
	word.copy_from_slice(&data[start..end]);
	Ok(word)
}

fn u256_at(data: &[u8], index: usize) -> Result<U256, ChainError> {
	Ok(U256::from_be_bytes(data_word(data, index)?))
}

fn u64_at(data: &[u8], index: usize) -> Result<u64, ChainError> {
	let value = u256_at(data, index)?;
	u64::try_from(value).map_err(|_| ChainError::Decode(format!("word {index} overflows u64")))
}

fn log_block_number(log: &LogEntry) -> Result<u64, ChainError> {
	match &log.block_number {
		Some(number) => parse_quantity(number),
		// Pending logs carry no block number; order within the stream still holds.
		None => Ok(0),
	}
}

/// Decode a `DonationReceived` log into a ledger donation event.
pub fn decode_donation_received(log: &LogEntry) -> Result<RawEvent, ChainError> {
	if log.topics.len() < 3 {
		return Err(ChainError::Decode(format!(
			"DonationReceived needs 3 topics, got {}",
			log.topics.len()
		)));
	}
	let donor = address_from_topic(&log.topics[1])?;
	let asset = address_from_topic(&log.topics[2])?;
	let data = hex_bytes(&log.data)?;

	Ok(RawEvent::Ledger {
		donor,
		asset,
		amount: u256_at(&data, 0)?,
		campaign_id: u64_at(&data, 1)?,
		timestamp: u64_at(&data, 2)?,
		block_number: log_block_number(log)?,
	})
}

/// Decode an `ETHDonation` log into a native donation event.
pub fn decode_eth_donation(log: &LogEntry) -> Result<RawEvent, ChainError> {
	if log.topics.len() < 2 {
		return Err(ChainError::Decode(format!(
			"ETHDonation needs 2 topics, got {}",
			log.topics.len()
		)));
	}
	let donor = address_from_topic(&log.topics[1])?;
	let data = hex_bytes(&log.data)?;

	Ok(RawEvent::Native {
		donor,
		amount: u256_at(&data, 0)?,
		timestamp: u64_at(&data, 1)?,
		block_number: log_block_number(log)?,
	})
}

/// Decode the return value of an `eth_call` to `decimals()`.
pub fn decode_decimals_result(result: &str) -> Result<u8, ChainError> {
	let data = hex_bytes(result)?;
	let value = u64_at(&data, 0)?;
	u8::try_from(value).map_err(|_| ChainError::Decode(format!("decimals {value} overflows u8")))
}
