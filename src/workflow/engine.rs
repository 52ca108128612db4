//! Donation transaction workflow engine.
//!
//! Drives user-initiated donations through their state machine: a single
//! transfer for native donations, and the strictly ordered approve-then-donate
//! pair for token donations. The engine owns submission, confirmation
//! waiting, and failure classification. It never mutates the projection; a
//! successful donation reaches the ledger through the live subscription's
//! event-driven refresh.
//!
//! Requests are independent: the engine holds no lock across a suspension
//! point and imposes no mutual exclusion between in-flight requests. Nothing
//! here retries; every failure is terminal for its request.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::utils::{ParseUnits, parse_units};
use alloy_primitives::{Address, U256};
use tracing::{error, info};

use crate::campaign::CampaignRegistry;
use crate::chain::types::ChainError;
use crate::ledger::reconciler::NATIVE_DECIMALS;
use crate::workflow::types::{
    DonationKind, DonationReceipt, DonationRequest, WorkflowError, WorkflowState,
};

/// Wallet-side signing and confirmation capability.
#[async_trait::async_trait]
pub trait WalletClient: Send + Sync {
    /// Transfer native currency to `to`, returning the transaction hash.
    async fn transfer_native(&self, to: Address, value: U256) -> Result<String, ChainError>;

    /// Wait until the transaction is included, or fail terminally.
    async fn wait_for_inclusion(&self, tx_hash: &str) -> Result<(), ChainError>;
}

/// ERC-20 token surface the token flow needs.
#[async_trait::async_trait]
pub trait TokenContract: Send + Sync {
    /// Declared decimal precision, queried from the token itself.
    async fn decimals(&self, token: Address) -> Result<u8, ChainError>;

    /// Approve `spender` to move `amount`, returning the transaction hash.
    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<String, ChainError>;

    async fn wait_for_inclusion(&self, tx_hash: &str) -> Result<(), ChainError>;
}

/// The donation manager's `donate` entry point.
#[async_trait::async_trait]
pub trait DonationContract: Send + Sync {
    async fn donate(
        &self,
        token: Address,
        amount: U256,
        campaign_id: u64,
    ) -> Result<String, ChainError>;

    async fn wait_for_inclusion(&self, tx_hash: &str) -> Result<(), ChainError>;
}

/// Executes donation requests against the chain.
pub struct WorkflowEngine {
    wallet: Arc<dyn WalletClient>,
    token: Arc<dyn TokenContract>,
    ledger: Arc<dyn DonationContract>,
    registry: CampaignRegistry,
    /// Destination of native transfers.
    charity_wallet: Address,
    /// Spender authorized by token approvals.
    donation_manager: Address,
    next_request_id: AtomicU64,
}

impl WorkflowEngine {
    pub fn new(
        wallet: Arc<dyn WalletClient>,
        token: Arc<dyn TokenContract>,
        ledger: Arc<dyn DonationContract>,
        registry: CampaignRegistry,
        charity_wallet: Address,
        donation_manager: Address,
    ) -> Self {
        Self {
            wallet,
            token,
            ledger,
            registry,
            charity_wallet,
            donation_manager,
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Execute one donation request to completion.
    ///
    /// The request is consumed; a failed request is retried by submitting a
    /// fresh one.
    pub async fn submit(
        &self,
        request: DonationRequest,
    ) -> Result<DonationReceipt, WorkflowError> {
        let DonationRequest {
            token,
            amount,
            campaign,
        } = request;
        match token {
            Some(token) => self.token_donation(&token, &amount, &campaign).await,
            None => self.native_donation(&amount, &campaign).await,
        }
    }

    /// Donate native currency directly to the charity wallet.
    async fn native_donation(
        &self,
        amount: &str,
        campaign: &str,
    ) -> Result<DonationReceipt, WorkflowError> {
        let mut run = WorkflowRun::new(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        info!(
            request = run.id,
            "Starting native donation of {:?} to campaign {:?}", amount, campaign
        );

        run.advance(WorkflowState::Validating);
        let value = match parse_positive_amount(amount, NATIVE_DECIMALS) {
            Ok(value) => value,
            Err(e) => return Err(run.fail(e)),
        };

        run.advance(WorkflowState::Submitting);
        let tx_hash = match self.wallet.transfer_native(self.charity_wallet, value).await {
            Ok(hash) => hash,
            Err(e) => return Err(run.fail(WorkflowError::TransactionRejected(e.to_string()))),
        };

        run.advance(WorkflowState::Confirming);
        if let Err(e) = self.wallet.wait_for_inclusion(&tx_hash).await {
            return Err(run.fail(WorkflowError::TransactionRejected(e.to_string())));
        }

        run.advance(WorkflowState::Succeeded);
        info!(request = run.id, "Native donation included: {}", tx_hash);
        Ok(DonationReceipt {
            tx_hash,
            kind: DonationKind::Native,
            campaign_id: 0,
        })
    }

    /// Donate an ERC-20 token through the approve-then-donate flow.
    ///
    /// The donate call is never attempted when the approval fails. When the
    /// donate call fails after a successful approval, the allowance is not
    /// rolled back; the error text surfaces that residue to the caller.
    async fn token_donation(
        &self,
        token_address: &str,
        amount: &str,
        campaign: &str,
    ) -> Result<DonationReceipt, WorkflowError> {
        let mut run = WorkflowRun::new(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        info!(
            request = run.id,
            "Starting token donation of {:?} of {:?} to campaign {:?}",
            amount,
            token_address,
            campaign
        );

        run.advance(WorkflowState::Validating);
        let token = match parse_token_address(token_address) {
            Ok(token) => token,
            Err(e) => return Err(run.fail(e)),
        };
        if let Err(e) = validate_amount(amount) {
            return Err(run.fail(e));
        }
        let campaign_id = self.registry.resolve_id(campaign);

        run.advance(WorkflowState::Submitting);
        // Precision comes from the token itself, never assumed.
        let decimals = match self.token.decimals(token).await {
            Ok(decimals) => decimals,
            Err(e) => return Err(run.fail(WorkflowError::InvalidToken(e.to_string()))),
        };
        let value = match parse_positive_amount(amount, decimals) {
            Ok(value) => value,
            Err(e) => return Err(run.fail(e)),
        };

        let approve_hash = match self
            .token
            .approve(token, self.donation_manager, value)
            .await
        {
            Ok(hash) => hash,
            Err(e) => return Err(run.fail(WorkflowError::ApprovalRejected(e.to_string()))),
        };

        run.advance(WorkflowState::Confirming);
        if let Err(e) = self.token.wait_for_inclusion(&approve_hash).await {
            return Err(run.fail(WorkflowError::ApprovalRejected(e.to_string())));
        }
        info!(request = run.id, "Approval included: {}", approve_hash);

        run.advance(WorkflowState::Submitting);
        let donate_hash = match self.ledger.donate(token, value, campaign_id).await {
            Ok(hash) => hash,
            Err(e) => return Err(run.fail(WorkflowError::DonationRejected(e.to_string()))),
        };

        run.advance(WorkflowState::Confirming);
        if let Err(e) = self.ledger.wait_for_inclusion(&donate_hash).await {
            return Err(run.fail(WorkflowError::DonationRejected(e.to_string())));
        }

        run.advance(WorkflowState::Succeeded);
        info!(request = run.id, "Token donation included: {}", donate_hash);
        Ok(DonationReceipt {
            tx_hash: donate_hash,
            kind: DonationKind::Token(token),
            campaign_id,
        })
    }
}

/// Per-request state tracker.
///
/// Each request gets its own run; completed or failed runs are simply
/// dropped, matching the transient lifecycle of a donation request.
struct WorkflowRun {
    id: u64,
    state: WorkflowState,
}

impl WorkflowRun {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: WorkflowState::Idle,
        }
    }

    fn advance(&mut self, next: WorkflowState) {
        info!(
            request = self.id,
            from = %self.state,
            to = %next,
            "Workflow transition"
        );
        self.state = next;
    }

    fn fail(&mut self, error: WorkflowError) -> WorkflowError {
        self.advance(WorkflowState::Failed);
        error!(request = self.id, "Donation workflow failed: {}", error);
        error
    }
}

fn parse_token_address(token_address: &str) -> Result<Address, WorkflowError> {
    let trimmed = token_address.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::InvalidToken(
            "token address is empty".to_string(),
        ));
    }
    trimmed
        .parse::<Address>()
        .map_err(|e| WorkflowError::InvalidToken(format!("{trimmed:?}: {e}")))
}

fn validate_amount(amount: &str) -> Result<(), WorkflowError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::InvalidAmount("amount is empty".to_string()));
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value > 0.0 => Ok(()),
        Ok(value) => Err(WorkflowError::InvalidAmount(format!(
            "amount must be positive, got {value}"
        ))),
        Err(e) => Err(WorkflowError::InvalidAmount(format!("{trimmed:?}: {e}"))),
    }
}

/// Convert a human decimal amount to smallest units at the given precision.
fn parse_positive_amount(amount: &str, decimals: u8) -> Result<U256, WorkflowError> {
    validate_amount(amount)?;
    let parsed = parse_units(amount.trim(), decimals)
        .map_err(|e| WorkflowError::InvalidAmount(e.to_string()))?;
    match parsed {
        ParseUnits::U256(value) if value > U256::ZERO => Ok(value),
        _ => Err(WorkflowError::InvalidAmount(
            "amount must be positive".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct MockWallet {
        transfers: AtomicUsize,
        fail_submit: bool,
        fail_wait: bool,
    }

    #[async_trait::async_trait]
    impl WalletClient for MockWallet {
        async fn transfer_native(&self, _to: Address, _value: U256) -> Result<String, ChainError> {
            self.transfers.fetch_add(1, Ordering::SeqCst);
            if self.fail_submit {
                return Err(ChainError::Rpc {
                    code: -32000,
                    message: "insufficient funds".to_string(),
                });
            }
            Ok("0xeth".to_string())
        }

        async fn wait_for_inclusion(&self, _tx_hash: &str) -> Result<(), ChainError> {
            if self.fail_wait {
                return Err(ChainError::NotIncluded("timed out".to_string()));
            }
            Ok(())
        }
    }

    struct MockToken {
        decimals: u8,
        approvals: AtomicUsize,
        approved_amount: Mutex<Option<U256>>,
        fail_approve: bool,
    }

    impl MockToken {
        fn new(decimals: u8) -> Self {
            Self {
                decimals,
                approvals: AtomicUsize::new(0),
                approved_amount: Mutex::new(None),
                fail_approve: false,
            }
        }

        fn failing(decimals: u8) -> Self {
            Self {
                fail_approve: true,
                ..Self::new(decimals)
            }
        }
    }

    #[async_trait::async_trait]
    impl TokenContract for MockToken {
        async fn decimals(&self, _token: Address) -> Result<u8, ChainError> {
            Ok(self.decimals)
        }

        async fn approve(
            &self,
            _token: Address,
            _spender: Address,
            amount: U256,
        ) -> Result<String, ChainError> {
            self.approvals.fetch_add(1, Ordering::SeqCst);
            if self.fail_approve {
                return Err(ChainError::Rpc {
                    code: -32000,
                    message: "approve reverted".to_string(),
                });
            }
            *self.approved_amount.lock().expect("lock") = Some(amount);
            Ok("0xapprove".to_string())
        }

        async fn wait_for_inclusion(&self, _tx_hash: &str) -> Result<(), ChainError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockLedger {
        donations: AtomicUsize,
        last_call: Mutex<Option<(Address, U256, u64)>>,
        fail_donate: bool,
    }

    #[async_trait::async_trait]
    impl DonationContract for MockLedger {
        async fn donate(
            &self,
            token: Address,
            amount: U256,
            campaign_id: u64,
        ) -> Result<String, ChainError> {
            self.donations.fetch_add(1, Ordering::SeqCst);
            if self.fail_donate {
                return Err(ChainError::Rpc {
                    code: -32000,
                    message: "donate reverted".to_string(),
                });
            }
            *self.last_call.lock().expect("lock") = Some((token, amount, campaign_id));
            Ok("0xdonate".to_string())
        }

        async fn wait_for_inclusion(&self, _tx_hash: &str) -> Result<(), ChainError> {
            Ok(())
        }
    }

    const TOKEN: &str = "0x00000000000000000000000000000000000000b2";

    fn native_request(amount: &str, campaign: &str) -> DonationRequest {
        DonationRequest {
            token: None,
            amount: amount.to_string(),
            campaign: campaign.to_string(),
        }
    }

    fn token_request(token: &str, amount: &str, campaign: &str) -> DonationRequest {
        DonationRequest {
            token: Some(token.to_string()),
            amount: amount.to_string(),
            campaign: campaign.to_string(),
        }
    }

    fn engine(
        wallet: MockWallet,
        token: MockToken,
        ledger: MockLedger,
    ) -> (WorkflowEngine, Arc<MockWallet>, Arc<MockToken>, Arc<MockLedger>) {
        let wallet = Arc::new(wallet);
        let token = Arc::new(token);
        let ledger = Arc::new(ledger);
        let engine = WorkflowEngine::new(
            wallet.clone(),
            token.clone(),
            ledger.clone(),
            CampaignRegistry::new(),
            Address::repeat_byte(0xca),
            Address::repeat_byte(0xd0),
        );
        (engine, wallet, token, ledger)
    }

    #[tokio::test]
    async fn native_donation_succeeds() {
        let (engine, wallet, _, _) =
            engine(MockWallet::default(), MockToken::new(18), MockLedger::default());

        let receipt = engine
            .submit(native_request("1.5", "Clean Water Initiative"))
            .await
            .expect("native donation");

        assert_eq!(receipt.tx_hash, "0xeth");
        assert_eq!(receipt.kind, DonationKind::Native);
        assert_eq!(wallet.transfers.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_token_field_selects_the_flow() {
        let (engine, wallet, token, ledger) =
            engine(MockWallet::default(), MockToken::new(18), MockLedger::default());

        let receipt = engine
            .submit(native_request("1", "Clean Water Initiative"))
            .await
            .expect("native donation");
        assert_eq!(receipt.kind, DonationKind::Native);

        let receipt = engine
            .submit(token_request(TOKEN, "1", "Clean Water Initiative"))
            .await
            .expect("token donation");
        assert!(matches!(receipt.kind, DonationKind::Token(_)));

        assert_eq!(wallet.transfers.load(Ordering::SeqCst), 1);
        assert_eq!(token.approvals.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.donations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_amounts_never_reach_submission() {
        let (engine, wallet, _, _) =
            engine(MockWallet::default(), MockToken::new(18), MockLedger::default());

        for amount in ["", "  ", "0", "-1", "abc"] {
            let err = engine
                .submit(native_request(amount, "Clean Water Initiative"))
                .await
                .expect_err("must fail");
            assert!(matches!(err, WorkflowError::InvalidAmount(_)), "{amount:?}");
        }
        assert_eq!(wallet.transfers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_transfer_is_terminal() {
        let wallet = MockWallet {
            fail_submit: true,
            ..MockWallet::default()
        };
        let (engine, wallet, _, _) = engine(wallet, MockToken::new(18), MockLedger::default());

        let err = engine
            .submit(native_request("1", "Clean Water Initiative"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, WorkflowError::TransactionRejected(_)));
        assert_eq!(wallet.transfers.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn confirmation_timeout_rejects_transfer() {
        let wallet = MockWallet {
            fail_wait: true,
            ..MockWallet::default()
        };
        let (engine, _, _, _) = engine(wallet, MockToken::new(18), MockLedger::default());

        let err = engine
            .submit(native_request("1", "Clean Water Initiative"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, WorkflowError::TransactionRejected(_)));
    }

    #[tokio::test]
    async fn malformed_token_address_fails_validation() {
        let (engine, _, token, _) =
            engine(MockWallet::default(), MockToken::new(18), MockLedger::default());

        for address in ["", "not-an-address", "0x1234"] {
            let err = engine
                .submit(token_request(address, "1", "Clean Water Initiative"))
                .await
                .expect_err("must fail");
            assert!(matches!(err, WorkflowError::InvalidToken(_)), "{address:?}");
        }
        assert_eq!(token.approvals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_approval_skips_donate_call() {
        let (engine, _, token, ledger) = engine(
            MockWallet::default(),
            MockToken::failing(18),
            MockLedger::default(),
        );

        let err = engine
            .submit(token_request(TOKEN, "1", "Clean Water Initiative"))
            .await
            .expect_err("must fail");

        assert!(matches!(err, WorkflowError::ApprovalRejected(_)));
        assert_eq!(token.approvals.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.donations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_donate_reports_residual_allowance() {
        let ledger = MockLedger {
            fail_donate: true,
            ..MockLedger::default()
        };
        let (engine, _, token, ledger) = engine(MockWallet::default(), MockToken::new(18), ledger);

        let err = engine
            .submit(token_request(TOKEN, "1", "Clean Water Initiative"))
            .await
            .expect_err("must fail");

        assert!(matches!(err, WorkflowError::DonationRejected(_)));
        assert_eq!(token.approvals.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.donations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_decimals_drive_unit_conversion() {
        let (engine, _, token, ledger) =
            engine(MockWallet::default(), MockToken::new(6), MockLedger::default());

        let receipt = engine
            .submit(token_request(TOKEN, "1.5", "Zero Hunger Mission"))
            .await
            .expect("token donation");

        assert_eq!(receipt.campaign_id, 2);
        let approved = (*token.approved_amount.lock().expect("lock")).expect("approved");
        assert_eq!(approved, U256::from(1_500_000u64));
        let (_, donated, campaign_id) =
            (*ledger.last_call.lock().expect("lock")).expect("donated");
        assert_eq!(donated, U256::from(1_500_000u64));
        assert_eq!(campaign_id, 2);
    }

    #[tokio::test]
    async fn unknown_campaign_donates_with_id_zero() {
        let (engine, _, _, ledger) =
            engine(MockWallet::default(), MockToken::new(18), MockLedger::default());

        let receipt = engine
            .submit(token_request(TOKEN, "1", "No Such Campaign"))
            .await
            .expect("token donation");

        assert_eq!(receipt.campaign_id, 0);
        let (_, _, campaign_id) = (*ledger.last_call.lock().expect("lock")).expect("donated");
        assert_eq!(campaign_id, 0);
    }
}
