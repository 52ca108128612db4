//! Locally reconstructed donation projection.
//!
//! The projection is derived from on-chain events on every resynchronization
//! and installed wholesale. Readers always see a complete snapshot; a cycle
//! that fails leaves the previous snapshot in place.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::Address;

/// One reconstructed donation, in asset-native units.
#[derive(Debug, Clone, PartialEq)]
pub struct DonationRecord {
    pub donor: Address,
    /// `"ETH"` for native donations, the token address otherwise.
    pub asset_label: String,
    /// Amount divided by the asset's decimal precision.
    pub human_amount: f64,
    pub campaign_name: String,
    pub timestamp: u64,
}

/// Rolling totals recomputed over the full event set on every cycle.
///
/// Totals are never patched incrementally; each resynchronization rebuilds
/// them from scratch so a missed event can never cause permanent drift.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregates {
    /// Total ETH donated through the charity wallet.
    pub total_eth: f64,
    /// Total token value donated through the donation manager.
    pub total_token: f64,
    /// Per-campaign totals, keyed by display name.
    pub per_campaign: BTreeMap<String, f64>,
}

/// The full projection for one client instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    /// Every reconstructed record in the window, newest first.
    pub records: Vec<DonationRecord>,
    /// The display slice: at most the 5 most recent records.
    pub recent: Vec<DonationRecord>,
    /// Aggregates over the full record set, not the display slice.
    pub aggregates: Aggregates,
    /// Chain head observed when this snapshot was built.
    pub synced_at_block: u64,
}

/// Shared handle to the current projection snapshot.
///
/// Installation swaps the whole `Arc` under the lock; no field-by-field
/// mutation is ever visible to readers.
#[derive(Clone, Default)]
pub struct ProjectionHandle {
    inner: Arc<Mutex<Arc<Projection>>>,
}

impl ProjectionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. The returned `Arc` stays internally consistent even
    /// if a newer snapshot is installed afterwards.
    pub fn snapshot(&self) -> Arc<Projection> {
        self.inner.lock().expect("projection lock poisoned").clone()
    }

    /// Install a freshly reconciled projection, replacing the old one
    /// wholesale.
    pub fn install(&self, projection: Projection) {
        *self.inner.lock().expect("projection lock poisoned") = Arc::new(projection);
    }
}
