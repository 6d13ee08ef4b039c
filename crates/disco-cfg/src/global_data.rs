//! Addresses found to be referenced as data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What a referenced data address holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalDataInfo {
    /// Start of a jump table, with its end if known.
    JumpTable(Option<u64>),
    /// Some value written or read by code.
    ReferencedValue,
}

/// Map from data address to classification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalData {
    entries: BTreeMap<u64, GlobalDataInfo>,
}

impl GlobalData {
    /// Record `info` at `addr`.
    ///
    /// A jump table takes precedence over a plain reference, and of two jump
    /// tables at the same address the longer one wins.
    pub fn record(&mut self, addr: u64, info: GlobalDataInfo) {
        use GlobalDataInfo::{JumpTable, ReferencedValue};

        let merged = match (self.entries.get(&addr).copied(), info) {
            (None, new) | (Some(ReferencedValue), new) => new,
            (Some(old @ JumpTable(_)), ReferencedValue) => old,
            (Some(JumpTable(a)), JumpTable(b)) => JumpTable(a.max(b)),
        };
        self.entries.insert(addr, merged);
    }

    pub fn get(&self, addr: u64) -> Option<GlobalDataInfo> {
        self.entries.get(&addr).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, GlobalDataInfo)> + '_ {
        self.entries.iter().map(|(addr, info)| (*addr, *info))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
