//! Donation sync service facade.
//!
//! Owns the two event sources, the campaign registry, a token decimals cache,
//! and the projection handle. Each `resync` is a full rebuild: fetch the
//! recent window from both sources, reconcile, and install the result
//! wholesale. A failed cycle leaves the previous projection untouched; the
//! next successful cycle supersedes it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::Address;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::campaign::CampaignRegistry;
use crate::chain::types::{BlockTag, ChainError, RawEvent};
use crate::ledger::fetcher::{ChainReader, EventSource, TokenMetadata, window_start};
use crate::ledger::projection::{Projection, ProjectionHandle};
use crate::ledger::reconciler::{DEFAULT_TOKEN_DECIMALS, reconcile};

/// Node connection status, surfaced to the presentation layer alongside the
/// projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// No cycle has completed yet.
    Connecting,
    /// The last cycle completed against the node.
    Connected,
    /// The last cycle failed; the previous projection remains installed.
    Degraded(String),
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Connecting => f.write_str("connecting"),
            SyncStatus::Connected => f.write_str("connected"),
            SyncStatus::Degraded(reason) => write!(f, "degraded: {reason}"),
        }
    }
}

/// Coordinates fetch and reconcile cycles for one client instance.
pub struct DonationSyncService {
    chain: Arc<dyn ChainReader>,
    ledger_source: Arc<dyn EventSource>,
    native_source: Arc<dyn EventSource>,
    tokens: Arc<dyn TokenMetadata>,
    registry: CampaignRegistry,
    /// Per-token display precision, resolved once per token and cached.
    decimals_cache: HashMap<Address, u8>,
    projection: ProjectionHandle,
    status: SyncStatus,
}

impl DonationSyncService {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        ledger_source: Arc<dyn EventSource>,
        native_source: Arc<dyn EventSource>,
        tokens: Arc<dyn TokenMetadata>,
        registry: CampaignRegistry,
    ) -> Self {
        Self {
            chain,
            ledger_source,
            native_source,
            tokens,
            registry,
            decimals_cache: HashMap::new(),
            projection: ProjectionHandle::new(),
            status: SyncStatus::Connecting,
        }
    }

    /// Shared handle the presentation layer reads snapshots from.
    pub fn handle(&self) -> ProjectionHandle {
        self.projection.clone()
    }

    /// Current projection snapshot.
    pub fn projection(&self) -> Arc<Projection> {
        self.projection.snapshot()
    }

    /// Outcome of the most recent cycle against the node.
    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Run one full fetch-and-reconcile cycle and install the result.
    ///
    /// Any fetch error aborts the cycle without touching the installed
    /// projection. There is no incremental path: every cycle rebuilds from
    /// the window, so a cycle raced by a newer one is simply overwritten.
    pub async fn resync(&mut self) -> Result<(), ChainError> {
        match self.run_cycle().await {
            Ok(()) => {
                self.status = SyncStatus::Connected;
                Ok(())
            }
            Err(e) => {
                self.status = SyncStatus::Degraded(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<(), ChainError> {
        let head = self.chain.block_number().await?;
        let from_block = window_start(head);

        let ledger_events = self
            .ledger_source
            .fetch_range(from_block, BlockTag::Latest)
            .await?;
        let native_events = self
            .native_source
            .fetch_range(from_block, BlockTag::Latest)
            .await?;

        self.refresh_decimals(&ledger_events).await;

        let mut projection = reconcile(
            &self.registry,
            &ledger_events,
            &native_events,
            &self.decimals_cache,
        );
        projection.synced_at_block = head;

        info!(
            "Reconciled {} donations up to block {}: {:.4} ETH, {:.4} tokens across {} campaigns",
            projection.records.len(),
            head,
            projection.aggregates.total_eth,
            projection.aggregates.total_token,
            projection.aggregates.per_campaign.len(),
        );

        self.projection.install(projection);
        Ok(())
    }

    /// Resolve display precision for tokens not seen before.
    ///
    /// Best effort: a token whose `decimals()` call fails is recorded with
    /// the 18-decimal fallback rather than failing the cycle, and is not
    /// retried.
    async fn refresh_decimals(&mut self, ledger_events: &[RawEvent]) {
        for event in ledger_events {
            let RawEvent::Ledger { asset, .. } = event else {
                continue;
            };
            if self.decimals_cache.contains_key(asset) {
                continue;
            }
            let decimals = match self.tokens.token_decimals(*asset).await {
                Ok(decimals) => decimals,
                Err(e) => {
                    warn!(
                        "Could not resolve decimals for token {}, assuming {}: {}",
                        asset, DEFAULT_TOKEN_DECIMALS, e
                    );
                    DEFAULT_TOKEN_DECIMALS
                }
            };
            self.decimals_cache.insert(*asset, decimals);
        }
    }

    /// Drive resynchronization from live event notifications.
    ///
    /// Runs until the notification channel closes. A failed cycle is logged
    /// and the loop continues; stale-but-consistent data is preferred over
    /// no data.
    pub async fn run_live(&mut self, notify_rx: &mut mpsc::Receiver<()>) {
        while notify_rx.recv().await.is_some() {
            if let Err(e) = self.resync().await {
                error!("Resynchronization failed, keeping previous projection: {}", e);
            }
        }
        info!("Notification channel closed, stopping live sync");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedChain(u64);

    #[async_trait::async_trait]
    impl ChainReader for FixedChain {
        async fn block_number(&self) -> Result<u64, ChainError> {
            Ok(self.0)
        }
    }

    /// Event source returning queued responses, one per fetch.
    struct ScriptedSource {
        responses: Mutex<Vec<Result<Vec<RawEvent>, ChainError>>>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<RawEvent>, ChainError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl EventSource for ScriptedSource {
        async fn fetch_range(
            &self,
            _from_block: u64,
            _to_block: BlockTag,
        ) -> Result<Vec<RawEvent>, ChainError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().expect("responses lock");
            if responses.is_empty() {
                Ok(Vec::new())
            } else {
                responses.remove(0)
            }
        }

        fn source_id(&self) -> Address {
            Address::ZERO
        }
    }

    struct FixedDecimals {
        decimals: u8,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TokenMetadata for FixedDecimals {
        async fn token_decimals(&self, _token: Address) -> Result<u8, ChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.decimals)
        }
    }

    fn ledger_event(amount: U256, timestamp: u64) -> RawEvent {
        RawEvent::Ledger {
            donor: Address::repeat_byte(0xd0),
            asset: Address::repeat_byte(0xee),
            amount,
            campaign_id: 1,
            timestamp,
            block_number: timestamp,
        }
    }

    #[tokio::test]
    async fn failed_cycle_keeps_previous_projection() {
        let good = vec![ledger_event(U256::from(10u64).pow(U256::from(18u64)), 100)];
        let ledger = ScriptedSource::new(vec![
            Ok(good),
            Err(ChainError::SourceUnavailable("node down".to_string())),
        ]);
        let native = ScriptedSource::new(vec![Ok(Vec::new()), Ok(Vec::new())]);
        let tokens = Arc::new(FixedDecimals {
            decimals: 18,
            calls: AtomicUsize::new(0),
        });

        let mut service = DonationSyncService::new(
            Arc::new(FixedChain(1_000)),
            ledger,
            native,
            tokens,
            CampaignRegistry::new(),
        );

        service.resync().await.expect("first cycle");
        let installed = service.projection();
        assert_eq!(installed.records.len(), 1);

        let err = service.resync().await.expect_err("second cycle fails");
        assert!(matches!(err, ChainError::SourceUnavailable(_)));
        assert_eq!(service.projection(), installed);
    }

    #[tokio::test]
    async fn status_tracks_last_cycle_outcome() {
        let ledger = ScriptedSource::new(vec![
            Ok(Vec::new()),
            Err(ChainError::SourceUnavailable("node down".to_string())),
            Ok(Vec::new()),
        ]);
        let native = ScriptedSource::new(vec![]);
        let tokens = Arc::new(FixedDecimals {
            decimals: 18,
            calls: AtomicUsize::new(0),
        });

        let mut service = DonationSyncService::new(
            Arc::new(FixedChain(1_000)),
            ledger,
            native,
            tokens,
            CampaignRegistry::new(),
        );

        assert_eq!(*service.status(), SyncStatus::Connecting);

        service.resync().await.expect("first cycle");
        assert_eq!(*service.status(), SyncStatus::Connected);

        service.resync().await.expect_err("second cycle fails");
        assert!(matches!(service.status(), SyncStatus::Degraded(_)));

        service.resync().await.expect("third cycle recovers");
        assert_eq!(*service.status(), SyncStatus::Connected);
    }

    #[tokio::test]
    async fn token_decimals_are_fetched_once_and_cached() {
        let event = ledger_event(U256::from(1_500_000u64), 100);
        let ledger = ScriptedSource::new(vec![Ok(vec![event.clone()]), Ok(vec![event])]);
        let native = ScriptedSource::new(vec![]);
        let tokens = Arc::new(FixedDecimals {
            decimals: 6,
            calls: AtomicUsize::new(0),
        });

        let mut service = DonationSyncService::new(
            Arc::new(FixedChain(1_000)),
            ledger,
            native,
            tokens.clone(),
            CampaignRegistry::new(),
        );

        service.resync().await.expect("first cycle");
        service.resync().await.expect("second cycle");

        assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
        let projection = service.projection();
        assert!((projection.records[0].human_amount - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn live_loop_resyncs_per_notification() {
        let ledger = ScriptedSource::new(vec![]);
        let native = ScriptedSource::new(vec![]);
        let fetch_counter = ledger.clone();
        let tokens = Arc::new(FixedDecimals {
            decimals: 18,
            calls: AtomicUsize::new(0),
        });

        let mut service = DonationSyncService::new(
            Arc::new(FixedChain(50)),
            ledger,
            native,
            tokens,
            CampaignRegistry::new(),
        );

        let (tx, mut rx) = mpsc::channel(8);
        tx.send(()).await.expect("notify");
        tx.send(()).await.expect("notify");
        drop(tx);

        service.run_live(&mut rx).await;
        assert_eq!(fetch_counter.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(service.projection().synced_at_block, 50);
    }
}
