//! Function entries and code ownership.

use std::collections::BTreeSet;

/// Ordered set of function entry addresses.
///
/// The function owning an address is the greatest entry at or below it, so
/// the entries partition code into disjoint ranges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionEntries {
    entries: BTreeSet<u64>,
}

impl FunctionEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns true if it was new.
    pub fn insert(&mut self, entry: u64) -> bool {
        self.entries.insert(entry)
    }

    pub fn contains(&self, entry: u64) -> bool {
        self.entries.contains(&entry)
    }

    /// Entry of the function owning `addr`.
    pub fn owner(&self, addr: u64) -> Option<u64> {
        self.entries.range(..=addr).next_back().copied()
    }

    /// Address range `[entry, next entry)` owned by `entry`.
    pub fn range_of(&self, entry: u64) -> (u64, Option<u64>) {
        let next = self.entries.range(entry.saturating_add(1)..).next().copied();
        (entry, next)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
