//! Types for the donation transaction workflow.

use std::fmt;

use alloy_primitives::Address;

/// What kind of donation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationKind {
    /// Direct native-currency transfer to the charity wallet.
    Native,
    /// Approve-then-donate flow through the donation manager.
    Token(Address),
}

/// A user-initiated donation, consumed by one workflow run.
#[derive(Debug, Clone)]
pub struct DonationRequest {
    /// ERC-20 token address to donate through the manager; `None` performs a
    /// direct native transfer.
    pub token: Option<String>,
    /// Human-entered decimal amount in asset-native units.
    pub amount: String,
    pub campaign: String,
}

/// Workflow progression for a single donation request.
///
/// `Idle → Validating → Submitting → Confirming → {Succeeded | Failed}`.
/// The token flow passes through `Submitting`/`Confirming` twice, once for
/// the approval and once for the donation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Validating,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Validating => "validating",
            WorkflowState::Submitting => "submitting",
            WorkflowState::Confirming => "confirming",
            WorkflowState::Succeeded => "succeeded",
            WorkflowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal failure of one donation request.
///
/// Every failure is terminal for that attempt; retrying is a fresh request.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("invalid donation amount: {0}")]
    InvalidAmount(String),

    #[error("invalid token address: {0}")]
    InvalidToken(String),

    #[error("transfer rejected: {0}")]
    TransactionRejected(String),

    #[error("token approval rejected: {0}")]
    ApprovalRejected(String),

    #[error("donation call rejected after approval succeeded; the approved allowance remains: {0}")]
    DonationRejected(String),
}

/// Result of a successfully completed donation workflow.
#[derive(Debug, Clone)]
pub struct DonationReceipt {
    /// Hash of the final transaction (the transfer, or the donate call).
    pub tx_hash: String,
    pub kind: DonationKind,
    /// Campaign id the donation was attributed to (0 for none).
    pub campaign_id: u64,
}
