//! Types for JSON-RPC node integration.

use alloy_primitives::{Address, U256};
use serde::Deserialize;

/// Block reference for a fetch range boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    /// A concrete block number.
    Number(u64),
    /// The current chain head as seen by the node.
    Latest,
}

impl BlockTag {
    /// Render the tag as a JSON-RPC block parameter.
    pub fn to_param(self) -> String {
        match self {
            BlockTag::Number(n) => format!("0x{:x}", n),
            BlockTag::Latest => "latest".to_string(),
        }
    }
}

/// A donation event decoded from one of the two on-chain sources.
///
/// `timestamp` is monotonically non-decreasing with block height but not
/// strictly increasing; same-block events share a timestamp and are ordered
/// by their position within the source stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// `DonationReceived` emitted by the donation manager contract.
    Ledger {
        donor: Address,
        asset: Address,
        amount: U256,
        campaign_id: u64,
        timestamp: u64,
        block_number: u64,
    },
    /// `ETHDonation` emitted by the charity wallet on a direct transfer.
    Native {
        donor: Address,
        amount: U256,
        timestamp: u64,
        block_number: u64,
    },
}

/// Raw log entry as returned by `eth_getLogs` and `eth_subscribe("logs")`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(default)]
    pub block_number: Option<String>,
}

/// Error types for node access and log decoding
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("event source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("block range rejected by node: {0}")]
    RangeTooLarge(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("log decode error: {0}")]
    Decode(String),

    #[error("transaction not included: {0}")]
    NotIncluded(String),
}
