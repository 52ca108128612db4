//! Live subscription management for new on-chain events.
//!
//! Keeps an explicit listener registry keyed by source identity so that
//! re-subscription is idempotent: `resubscribe` atomically replaces the
//! listener for each source instead of stacking a second one. Duplicate
//! listeners would mean duplicate notifications and duplicate reconciliation
//! passes, the defect class this registry exists to rule out.
//!
//! A notification carries no payload; every notification triggers a full
//! re-fetch and reconcile cycle, so missed or coalesced notifications can
//! never cause permanent drift.

use std::collections::HashMap;

use alloy_primitives::Address;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Spawns one background listener task for an event source.
///
/// Factored out of the manager so tests can observe listener lifecycles
/// without a WebSocket endpoint.
pub trait ListenerSpawner: Send + Sync {
    fn spawn_listener(&self, source: Address, notify: mpsc::Sender<()>) -> JoinHandle<()>;
}

/// Registry of live event listeners, one per source.
pub struct SubscriptionManager<S: ListenerSpawner> {
    spawner: S,
    listeners: HashMap<Address, JoinHandle<()>>,
    notify_tx: mpsc::Sender<()>,
}

impl<S: ListenerSpawner> SubscriptionManager<S> {
    /// Create a manager and the notification receiver the sync loop reads.
    ///
    /// The channel is bounded and listeners drop notifications when it is
    /// full; a pending notification already guarantees a full rebuild.
    pub fn new(spawner: S) -> (Self, mpsc::Receiver<()>) {
        let (notify_tx, notify_rx) = mpsc::channel(8);
        (
            Self {
                spawner,
                listeners: HashMap::new(),
                notify_tx,
            },
            notify_rx,
        )
    }

    /// Replace the listener set for the given sources.
    ///
    /// Any existing listener on one of these sources is aborted before the
    /// new one is spawned, so calling this twice leaves exactly one listener
    /// per source.
    pub fn resubscribe(&mut self, sources: &[Address]) {
        for source in sources {
            if let Some(existing) = self.listeners.remove(source) {
                debug!("Aborting existing listener for {}", source);
                existing.abort();
            }
            let handle = self.spawner.spawn_listener(*source, self.notify_tx.clone());
            self.listeners.insert(*source, handle);
        }
        info!("Subscribed to {} event sources", self.listeners.len());
    }

    /// Abort every registered listener.
    pub fn unsubscribe_all(&mut self) {
        for (source, handle) in self.listeners.drain() {
            debug!("Aborting listener for {}", source);
            handle.abort();
        }
    }

    /// Number of currently registered listeners.
    pub fn active_listeners(&self) -> usize {
        self.listeners.len()
    }
}

impl<S: ListenerSpawner> Drop for SubscriptionManager<S> {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

/// Listener spawner backed by a node WebSocket endpoint.
pub struct WsListenerSpawner {
    ws_url: String,
}

impl WsListenerSpawner {
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

impl ListenerSpawner for WsListenerSpawner {
    fn spawn_listener(&self, source: Address, notify: mpsc::Sender<()>) -> JoinHandle<()> {
        let ws_url = self.ws_url.clone();
        tokio::spawn(async move {
            if let Err(e) = run_log_listener(&ws_url, source, notify).await {
                warn!("Log listener for {} terminated: {}", source, e);
            }
        })
    }
}

/// Subscribe to a contract's logs over WebSocket and forward a unit
/// notification per emitted log.
///
/// The listener terminates on stream end or error; it never reconnects on
/// its own. Re-establishing it is an explicit `resubscribe` by the caller.
async fn run_log_listener(
    ws_url: &str,
    source: Address,
    notify: mpsc::Sender<()>,
) -> Result<(), crate::chain::types::ChainError> {
    debug!("Attempting WebSocket connection to: {}", ws_url);
    let (ws_stream, response) = connect_async(ws_url).await?;
    debug!(
        "WebSocket connection established, response status: {}",
        response.status()
    );
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let subscribe_message = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": ["logs", { "address": format!("{source}") }],
    });
    ws_sender
        .send(Message::Text(subscribe_message.to_string()))
        .await?;

    info!("Listening for new events from {}", source);

    while let Some(message) = ws_receiver.next().await {
        match message? {
            Message::Text(text) => {
                let parsed: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Ignoring unparseable subscription message: {}", e);
                        continue;
                    }
                };
                if parsed.get("method").and_then(|m| m.as_str()) == Some("eth_subscription") {
                    debug!("New event notification from {}", source);
                    // A full rebuild is already pending when the channel is
                    // full; dropping the extra notification is safe.
                    let _ = notify.try_send(());
                }
            }
            Message::Close(_) => {
                debug!("Subscription stream for {} closed", source);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
