//! Reconciliation of the two donation event streams into one projection.
//!
//! `reconcile` is pure and idempotent: it performs no I/O, and the same two
//! input sequences always produce the same records and aggregates. The sync
//! service calls it on every cycle and installs the output wholesale.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use alloy_primitives::utils::format_units;

use crate::campaign::{CampaignRegistry, GENERAL_ETH_CAMPAIGN};
use crate::chain::types::RawEvent;
use crate::ledger::projection::{Aggregates, DonationRecord, Projection};

/// Decimal precision of the chain's native currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// Asset label used for native-currency donation records.
pub const NATIVE_ASSET_LABEL: &str = "ETH";

/// Fallback precision for tokens whose `decimals()` could not be resolved.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// How many records the display slice keeps. Aggregates always cover the
/// full set regardless of this limit.
pub const RECENT_DISPLAY_LIMIT: usize = 5;

/// Convert a smallest-unit amount to asset-native units.
fn to_human(amount: U256, decimals: u8) -> f64 {
    format_units(amount, decimals)
        .ok()
        .and_then(|formatted| formatted.parse().ok())
        .unwrap_or(0.0)
}

/// Merge, attribute, and order both event streams, and compute aggregates.
///
/// Ledger events are converted first, then native events; the final sort by
/// descending timestamp is stable, so same-timestamp events keep that order
/// (ledger before native) as a deterministic tie-break. `token_decimals`
/// supplies per-token display precision; unknown tokens fall back to
/// [`DEFAULT_TOKEN_DECIMALS`].
pub fn reconcile(
    registry: &CampaignRegistry,
    ledger_events: &[RawEvent],
    native_events: &[RawEvent],
    token_decimals: &HashMap<Address, u8>,
) -> Projection {
    let mut records = Vec::with_capacity(ledger_events.len() + native_events.len());
    let mut aggregates = Aggregates::default();

    for event in ledger_events {
        let RawEvent::Ledger {
            donor,
            asset,
            amount,
            campaign_id,
            timestamp,
            ..
        } = event
        else {
            continue;
        };
        let decimals = token_decimals
            .get(asset)
            .copied()
            .unwrap_or(DEFAULT_TOKEN_DECIMALS);
        let value = to_human(*amount, decimals);
        let campaign_name = registry.resolve_name(*campaign_id).to_string();

        aggregates.total_token += value;
        *aggregates
            .per_campaign
            .entry(campaign_name.clone())
            .or_insert(0.0) += value;

        records.push(DonationRecord {
            donor: *donor,
            asset_label: format!("{asset}"),
            human_amount: value,
            campaign_name,
            timestamp: *timestamp,
        });
    }

    for event in native_events {
        let RawEvent::Native {
            donor,
            amount,
            timestamp,
            ..
        } = event
        else {
            continue;
        };
        let value = to_human(*amount, NATIVE_DECIMALS);

        aggregates.total_eth += value;
        *aggregates
            .per_campaign
            .entry(GENERAL_ETH_CAMPAIGN.to_string())
            .or_insert(0.0) += value;

        records.push(DonationRecord {
            donor: *donor,
            asset_label: NATIVE_ASSET_LABEL.to_string(),
            human_amount: value,
            campaign_name: GENERAL_ETH_CAMPAIGN.to_string(),
            timestamp: *timestamp,
        });
    }

    // Stable sort: ties keep ledger-before-native conversion order.
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let recent = records.iter().take(RECENT_DISPLAY_LIMIT).cloned().collect();

    Projection {
        records,
        recent,
        aggregates,
        synced_at_block: 0,
    }
}
