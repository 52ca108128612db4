//! Donation ledger synchronizer and transaction workflow engine.
//!
//! Reconstructs a consistent, deduplicated, campaign-attributed donation
//! ledger from two independent on-chain event streams, and drives user
//! donations (direct ETH transfers and approve-then-donate token flows)
//! through their transaction workflows. Everything presentation-side is an
//! external collaborator; this crate exposes the projection, the sync
//! operations, and the donation submission surface.

pub mod campaign;
pub mod chain;
pub mod ledger;
pub mod workflow;
