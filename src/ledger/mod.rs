//! Donation Ledger Synchronization Module
//!
//! This module holds the core logic for reconstructing the donation ledger
//! from on-chain events. It is composed of several submodules, each
//! responsible for one aspect of the process:
//!
//! - `fetcher`: event retrieval seams and the bounded refetch window policy.
//! - `reconciler`: the pure merge of both event streams into records and
//!   rolling aggregates.
//! - `projection`: the snapshot store readers observe, always installed
//!   wholesale.
//! - `subscription`: the live listener registry that triggers resyncs on new
//!   events, with idempotent re-subscription.
//! - `service`: the facade wiring fetch, reconcile, and install into one
//!   resynchronization cycle.

/// Event retrieval seams and window policy
pub mod fetcher;
/// Projection snapshot store
pub mod projection;
/// Pure reconciliation of the two event streams
pub mod reconciler;
/// Sync service facade
pub mod service;
/// Live event subscription registry
pub mod subscription;

pub use projection::{Aggregates, DonationRecord, Projection, ProjectionHandle};
pub use service::{DonationSyncService, SyncStatus};
