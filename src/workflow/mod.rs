//! Donation transaction workflows.
//!
//! Multi-step, fallible blockchain transactions: the direct native transfer
//! and the approve-then-donate token flow, with sequencing, confirmation
//! waiting, and failure classification.

/// Workflow engine and its contract seams
pub mod engine;
/// Request, state, and error types
pub mod types;

pub use engine::WorkflowEngine;
pub use types::{DonationKind, DonationReceipt, DonationRequest, WorkflowError, WorkflowState};
