//! Node integration for an Ethereum-style chain.
//!
//! This module provides the JSON-RPC client, the ABI helpers for the
//! donation contracts, and the raw event types shared by the rest of the
//! crate. The node is treated as a black box exposing block height, log
//! queries over a range, log push notifications, and transaction submission.

/// JSON-RPC client and typed contract handles
pub mod client;
/// ABI encoding and log decoding for the donation contracts
pub mod contracts;
/// Shared node-facing types and errors
pub mod types;

pub use client::EthRpcClient;
pub use types::{BlockTag, ChainError, LogEntry, RawEvent};
