//! Discovery configuration.

use crate::frontier::FrontierOrder;

/// Tuning knobs for a discovery run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Drain order of the block frontier.
    pub frontier_order: FrontierOrder,
    /// Number of changing merges into one address before joins widen.
    pub widen_after: u32,
    /// Queue code pointers found in read-only data.
    pub explore_static_data: bool,
    /// Treat symbol-table addresses as function entries.
    pub seed_symbols: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            frontier_order: FrontierOrder::LowestFirst,
            widen_after: 8,
            explore_static_data: false,
            seed_symbols: false,
        }
    }
}

impl DiscoveryConfig {
    #[must_use]
    pub const fn with_frontier_order(mut self, order: FrontierOrder) -> Self {
        self.frontier_order = order;
        self
    }

    #[must_use]
    pub const fn with_widen_after(mut self, visits: u32) -> Self {
        self.widen_after = visits;
        self
    }

    /// Scan read-only segments for code pointers.
    #[must_use]
    pub const fn with_static_data(mut self, enabled: bool) -> Self {
        self.explore_static_data = enabled;
        self
    }

    #[must_use]
    pub const fn with_symbol_seeding(mut self, enabled: bool) -> Self {
        self.seed_symbols = enabled;
        self
    }
}
