//! Static campaign registry.
//!
//! Campaigns are identified by a small integer on-chain and a display name
//! off-chain. The registry is built once at startup and never mutated; both
//! lookup directions are total (unknown names map to id 0, unknown ids map to
//! the literal `"Unknown"`).

/// Pseudo-campaign attributed to direct ETH transfers, which carry no
/// campaign id on-chain.
pub const GENERAL_ETH_CAMPAIGN: &str = "General ETH Donation";

/// Display name for campaign ids with no registry entry.
pub const UNKNOWN_CAMPAIGN: &str = "Unknown";

/// Immutable bidirectional mapping between campaign names and on-chain ids.
#[derive(Debug, Clone)]
pub struct CampaignRegistry {
    entries: Vec<(String, u64)>,
}

impl CampaignRegistry {
    /// Build the registry with the default campaign table.
    pub fn new() -> Self {
        Self::with_entries(vec![
            ("Clean Water Initiative".to_string(), 1),
            ("Zero Hunger Mission".to_string(), 2),
            ("Reforestation Project".to_string(), 3),
            ("Health & Relief Fund".to_string(), 4),
            ("Education for All".to_string(), 5),
            ("Animal Welfare Fund".to_string(), 6),
        ])
    }

    /// Build a registry from an explicit table.
    pub fn with_entries(entries: Vec<(String, u64)>) -> Self {
        Self { entries }
    }

    /// Resolve a campaign name to its on-chain id.
    ///
    /// Unknown names resolve to `0`, which the donation contract treats as
    /// "no campaign".
    pub fn resolve_id(&self, name: &str) -> u64 {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
            .unwrap_or(0)
    }

    /// Resolve an on-chain campaign id to its display name.
    pub fn resolve_name(&self, id: u64) -> &str {
        self.entries
            .iter()
            .find(|(_, i)| *i == id)
            .map(|(n, _)| n.as_str())
            .unwrap_or(UNKNOWN_CAMPAIGN)
    }

    /// Iterate over the registered campaign names, for presentation layers.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl Default for CampaignRegistry {
    fn default() -> Self {
        Self::new()
    }
}
