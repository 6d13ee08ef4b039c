//! Work queues of addresses awaiting exploration.

use std::collections::BTreeMap;
use std::fmt;

/// Why an address entered a frontier. Diagnostic only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrontierReason {
    /// Found as a code pointer in static data.
    InData,
    /// Written to memory by the block at the given address.
    InWrite(u64),
    /// Return address of the call in the given block.
    ReturnAddress(u64),
    /// Successor of the given block.
    NextIp(u64),
    /// Initial entry point or symbol.
    StartAddr,
    /// Block split inside the region starting at the given address.
    SplitAt(u64),
}

impl fmt::Display for FrontierReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InData => write!(f, "in data"),
            Self::InWrite(src) => write!(f, "written by {src:#x}"),
            Self::ReturnAddress(src) => write!(f, "return from {src:#x}"),
            Self::NextIp(src) => write!(f, "successor of {src:#x}"),
            Self::StartAddr => write!(f, "start address"),
            Self::SplitAt(region) => write!(f, "split of {region:#x}"),
        }
    }
}

/// Order in which the block frontier is drained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontierOrder {
    #[default]
    LowestFirst,
    HighestFirst,
}

/// Set of pending addresses with the reason each was queued.
#[derive(Clone, Debug, Default)]
pub struct Frontier {
    order: FrontierOrder,
    pending: BTreeMap<u64, FrontierReason>,
}

impl Frontier {
    pub const fn new(order: FrontierOrder) -> Self {
        Self {
            order,
            pending: BTreeMap::new(),
        }
    }

    /// Queue `addr`. An address already queued keeps its first reason.
    ///
    /// Returns true if the address was not queued yet.
    pub fn push(&mut self, addr: u64, reason: FrontierReason) -> bool {
        if self.pending.contains_key(&addr) {
            return false;
        }
        self.pending.insert(addr, reason);
        true
    }

    /// Take the next address according to the drain order.
    pub fn pop(&mut self) -> Option<(u64, FrontierReason)> {
        match self.order {
            FrontierOrder::LowestFirst => self.pending.pop_first(),
            FrontierOrder::HighestFirst => self.pending.pop_last(),
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.pending.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_first_reason_wins() {
        let mut f = Frontier::new(FrontierOrder::HighestFirst);
        assert!(f.push(0x10, FrontierReason::StartAddr));
        assert!(f.push(0x20, FrontierReason::NextIp(0x10)));
        assert!(!f.push(0x10, FrontierReason::InData));
        assert_eq!(f.pop(), Some((0x20, FrontierReason::NextIp(0x10))));
        assert_eq!(f.pop(), Some((0x10, FrontierReason::StartAddr)));
        assert!(f.pop().is_none());
    }
}
