//! Event fetching over a bounded block window.
//!
//! Defines the read-side seams the synchronizer consumes: an event source per
//! contract, a chain-head reader, and a token metadata reader. Concrete
//! implementations backed by a JSON-RPC node live in `crate::chain::client`;
//! tests substitute in-memory mocks.

use alloy_primitives::Address;

use crate::chain::types::{BlockTag, ChainError, RawEvent};

/// How far back each resynchronization looks from the current chain head.
///
/// Bounded cost per refresh is traded for incomplete history on long-idle
/// clients; a known limitation, not a bug.
pub const SYNC_WINDOW_BLOCKS: u64 = 50_000;

/// First block of the refetch window for a given chain head.
pub fn window_start(head: u64) -> u64 {
    head.saturating_sub(SYNC_WINDOW_BLOCKS)
}

/// One on-chain event source queried over an inclusive block range.
///
/// `fetch_range` fails with [`ChainError::SourceUnavailable`] when the node
/// cannot be reached and [`ChainError::RangeTooLarge`] when the node rejects
/// the window. The fetcher never auto-chunks; shrinking and retrying is the
/// caller's decision.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch all events emitted by this source in `[from_block, to_block]`,
    /// in stream order.
    async fn fetch_range(
        &self,
        from_block: u64,
        to_block: BlockTag,
    ) -> Result<Vec<RawEvent>, ChainError>;

    /// Identity of the source, used as the subscription registry key.
    fn source_id(&self) -> Address;
}

/// Read access to the chain head.
#[async_trait::async_trait]
pub trait ChainReader: Send + Sync {
    /// Current block height as seen by the node.
    async fn block_number(&self) -> Result<u64, ChainError>;
}

/// Read access to ERC-20 token metadata.
#[async_trait::async_trait]
pub trait TokenMetadata: Send + Sync {
    /// Declared decimal precision of the token.
    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError>;
}
