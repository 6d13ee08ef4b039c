//! The discovery state: everything learned about a program so far.

use std::collections::{BTreeMap, BTreeSet};

use disco_arch::Architecture;
use disco_arch::syscalls::SyscallTable;
use disco_ir::Block;
use disco_mem::Memory;
use rustc_hash::FxHashMap;

use crate::abs_state::AbsBlockState;
use crate::classify::{ParsedBlock, classify_block};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::frontier::{Frontier, FrontierOrder, FrontierReason};
use crate::functions::FunctionEntries;
use crate::global_data::{GlobalData, GlobalDataInfo};
use crate::region::{BlockMap, BlockRegion};
use crate::summary::{FunctionSummary, summarize};

/// Aggregate state of one discovery run.
///
/// Produced by [`crate::Discoverer::run`] once both frontiers are empty; the
/// queries below are only meaningful on that finished snapshot.
pub struct DiscoveryState<A: Architecture> {
    pub(crate) memory: Memory,
    pub(crate) arch: A,
    pub(crate) symbols: BTreeMap<u64, String>,
    pub(crate) syscalls: SyscallTable,
    pub(crate) config: DiscoveryConfig,
    /// Next free assignment id; shared by all blocks of the run.
    pub(crate) next_assign_id: u64,
    pub(crate) blocks: BlockMap,
    pub(crate) functions: FunctionEntries,
    /// Successor address to the blocks that reach it.
    pub(crate) reverse_edges: BTreeMap<u64, BTreeSet<u64>>,
    pub(crate) global_data: GlobalData,
    pub(crate) frontier: Frontier,
    pub(crate) function_frontier: Frontier,
    pub(crate) abs_states: BTreeMap<u64, AbsBlockState>,
    /// Entry state each block was last propagated with.
    pub(crate) explored: FxHashMap<u64, AbsBlockState>,
    /// Changing merges per address, for widening.
    pub(crate) visits: FxHashMap<u64, u32>,
}

impl<A: Architecture> DiscoveryState<A> {
    pub(crate) fn new(
        memory: Memory,
        arch: A,
        syscalls: SyscallTable,
        symbols: BTreeMap<u64, String>,
        config: DiscoveryConfig,
    ) -> Self {
        let frontier = Frontier::new(config.frontier_order);
        Self {
            memory,
            arch,
            symbols,
            syscalls,
            config,
            next_assign_id: 0,
            blocks: BlockMap::default(),
            functions: FunctionEntries::new(),
            reverse_edges: BTreeMap::new(),
            global_data: GlobalData::default(),
            frontier,
            function_frontier: Frontier::new(FrontierOrder::LowestFirst),
            abs_states: BTreeMap::new(),
            explored: FxHashMap::default(),
            visits: FxHashMap::default(),
        }
    }

    pub const fn memory(&self) -> &Memory {
        &self.memory
    }

    pub const fn arch(&self) -> &A {
        &self.arch
    }

    pub const fn syscalls(&self) -> &SyscallTable {
        &self.syscalls
    }

    pub const fn symbols(&self) -> &BTreeMap<u64, String> {
        &self.symbols
    }

    pub const fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub const fn blocks(&self) -> &BlockMap {
        &self.blocks
    }

    /// Block starting at `addr`.
    pub fn block(&self, addr: u64) -> Option<&Block> {
        self.blocks.block(addr)
    }

    pub const fn functions(&self) -> &FunctionEntries {
        &self.functions
    }

    /// Entry of the function owning `addr`.
    pub fn owner(&self, addr: u64) -> Option<u64> {
        self.functions.owner(addr)
    }

    pub const fn global_data(&self) -> &GlobalData {
        &self.global_data
    }

    pub const fn abs_states(&self) -> &BTreeMap<u64, AbsBlockState> {
        &self.abs_states
    }

    pub fn abs_state(&self, addr: u64) -> Option<&AbsBlockState> {
        self.abs_states.get(&addr)
    }

    /// Blocks known to transfer control to `addr`.
    pub fn predecessors(&self, addr: u64) -> impl Iterator<Item = u64> + '_ {
        self.reverse_edges.get(&addr).into_iter().flatten().copied()
    }

    pub const fn reverse_edges(&self) -> &BTreeMap<u64, BTreeSet<u64>> {
        &self.reverse_edges
    }

    /// Check if both frontiers are drained.
    pub fn is_settled(&self) -> bool {
        self.frontier.is_empty() && self.function_frontier.is_empty()
    }

    /// Classify the terminator of the block at `addr`.
    pub fn classify(&self, addr: u64) -> Result<ParsedBlock> {
        let block = self
            .blocks
            .block(addr)
            .ok_or_else(|| DiscoveryError::Unreachable(format!("no block at {addr:#x}")))?;
        classify_block(self, block)
    }

    /// Classification of every block, keyed by address.
    pub fn classify_all(&self) -> Result<BTreeMap<u64, ParsedBlock>> {
        self.blocks
            .blocks()
            .map(|block| Ok((block.addr, classify_block(self, block)?)))
            .collect()
    }

    /// Per-function summaries, built in parallel.
    pub fn summaries(&self) -> Result<Vec<FunctionSummary>> {
        summarize(self)
    }

    /// Summaries rendered as pretty JSON.
    pub fn summaries_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.summaries()?)?)
    }

    // Named updates used by the engine.

    pub(crate) fn insert_region(&mut self, region: BlockRegion) {
        self.blocks.insert(region);
    }

    pub(crate) fn add_function(&mut self, entry: u64) -> bool {
        self.functions.insert(entry)
    }

    pub(crate) fn set_abs_state(&mut self, addr: u64, state: AbsBlockState) {
        self.abs_states.insert(addr, state);
    }

    pub(crate) fn record_global(&mut self, addr: u64, info: GlobalDataInfo) {
        self.global_data.record(addr, info);
    }

    pub(crate) fn add_edge(&mut self, from: u64, to: u64) {
        self.reverse_edges.entry(to).or_default().insert(from);
    }

    pub(crate) fn push_block(&mut self, addr: u64, reason: FrontierReason) -> bool {
        self.frontier.push(addr, reason)
    }

    pub(crate) fn push_function(&mut self, addr: u64, reason: FrontierReason) -> bool {
        if self.functions.contains(addr) {
            return false;
        }
        self.function_frontier.push(addr, reason)
    }
}
