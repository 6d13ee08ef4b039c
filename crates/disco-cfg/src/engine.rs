//! Frontier-driven discovery loop.

use std::collections::BTreeMap;

use disco_arch::syscalls::SyscallTable;
use disco_arch::{Architecture, DecodeError, Flow};
use disco_ir::{BinaryOp, Block, BlockBuilder, BlockLabel, Expr, Reg, RegState, Stmt, TermStmt};
use disco_mem::Memory;
use tracing::{debug, trace, trace_span, warn};

use crate::abs_state::AbsBlockState;
use crate::classify::{CallTarget, ParsedTerm, classify_block};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::frontier::FrontierReason;
use crate::global_data::GlobalDataInfo;
use crate::region::{BlockRegion, Location};
use crate::state::DiscoveryState;
use crate::transfer::BlockTransfer;
use crate::value::AbsValue;

/// How a disassembled run ends.
enum Ending {
    /// Continue at the end address (stop address or failing instruction).
    FallThrough,
    /// The instruction pointer holds the target.
    Jump,
    Branch { cond: Expr, taken: u64 },
    Syscall,
}

/// Builder and driver of a discovery run.
///
/// ```ignore
/// let state = Discoverer::new(memory, X86_64::new())
///     .with_syscalls(linux_x86_64())
///     .run(entry)?;
/// ```
pub struct Discoverer<A: Architecture> {
    memory: Memory,
    arch: A,
    syscalls: SyscallTable,
    symbols: BTreeMap<u64, String>,
    config: DiscoveryConfig,
}

impl<A: Architecture> Discoverer<A> {
    pub fn new(memory: Memory, arch: A) -> Self {
        Self {
            memory,
            arch,
            syscalls: SyscallTable::default(),
            symbols: BTreeMap::new(),
            config: DiscoveryConfig::default(),
        }
    }

    /// Set the syscall personality. Without one every syscall is unknown.
    #[must_use]
    pub fn with_syscalls(mut self, syscalls: SyscallTable) -> Self {
        self.syscalls = syscalls;
        self
    }

    /// Set the symbol table (address to name).
    #[must_use]
    pub fn with_symbols(mut self, symbols: BTreeMap<u64, String>) -> Self {
        self.symbols = symbols;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Discover code reachable from `entry` and return the settled state.
    pub fn run(self, entry: u64) -> Result<DiscoveryState<A>> {
        let _span = trace_span!("discover", entry = %format_args!("{entry:#x}")).entered();
        let mut state = DiscoveryState::new(
            self.memory,
            self.arch,
            self.syscalls,
            self.symbols,
            self.config,
        );

        state.push_function(entry, FrontierReason::StartAddr);
        if state.config.seed_symbols {
            let seeds: Vec<u64> = state.symbols.keys().copied().collect();
            for addr in seeds {
                state.push_function(addr, FrontierReason::StartAddr);
            }
        }
        if state.config.explore_static_data {
            state.scan_static_data();
        }

        state.drive()?;

        debug!(
            functions = state.functions.len(),
            blocks = state.blocks.len(),
            global_data = state.global_data.len(),
            "discovery complete"
        );
        Ok(state)
    }
}

impl<A: Architecture> DiscoveryState<A> {
    fn num_regs(&self) -> usize {
        self.arch.reg_widths().len()
    }

    /// Run until both frontiers are empty and a settle pass adds nothing.
    pub(crate) fn drive(&mut self) -> Result<()> {
        let mut rounds = 0usize;
        loop {
            while let Some((addr, reason)) = self.frontier.pop() {
                self.explore_block(addr, reason)?;
            }
            if let Some((addr, reason)) = self.function_frontier.pop() {
                self.start_function(addr, reason);
                continue;
            }
            rounds += 1;
            if !self.settle()? {
                trace!(rounds, "frontiers drained");
                return Ok(());
            }
        }
    }

    /// Re-propagate every block against the current function partition.
    ///
    /// Classification depends on function ownership, which keeps changing
    /// while functions are found. Returns true if new work was queued.
    fn settle(&mut self) -> Result<bool> {
        let _span = trace_span!("settle").entered();
        let addrs: Vec<u64> = self.blocks.blocks().map(|b| b.addr).collect();
        for addr in addrs {
            self.propagate(addr)?;
        }
        Ok(!self.is_settled())
    }

    /// Make `addr` a function entry and queue its body.
    pub(crate) fn start_function(&mut self, addr: u64, reason: FrontierReason) {
        if self.functions.contains(addr) {
            return;
        }
        if !self.memory.is_code_address(addr) {
            trace!(addr = %format_args!("{addr:#x}"), %reason, "function candidate is not code");
            return;
        }
        debug!(addr = %format_args!("{addr:#x}"), %reason, "new function");
        self.add_function(addr);
        let entry = AbsBlockState::function_entry(
            self.num_regs(),
            self.arch.sp_reg(),
            self.arch.ip_reg(),
            addr,
            self.arch.addr_width(),
        );
        self.merge_state(addr, &entry, reason);
    }

    /// Join `incoming` into the state at `addr`, queueing it if it changed.
    ///
    /// After `widen_after` changing merges into one address, joins widen.
    pub(crate) fn merge_state(
        &mut self,
        addr: u64,
        incoming: &AbsBlockState,
        reason: FrontierReason,
    ) -> bool {
        let changed = match self.abs_states.get_mut(&addr) {
            None => {
                self.abs_states.insert(addr, incoming.clone());
                true
            }
            Some(current) => {
                let visits = self.visits.entry(addr).or_default();
                let changed = if *visits >= self.config.widen_after {
                    current.widen_from(incoming)
                } else {
                    current.join_from(incoming)
                };
                if changed {
                    *visits += 1;
                }
                changed
            }
        };
        if changed {
            self.push_block(addr, reason);
        }
        changed
    }

    fn explore_block(&mut self, addr: u64, reason: FrontierReason) -> Result<()> {
        let entry = self
            .abs_states
            .get(&addr)
            .ok_or(DiscoveryError::MissingAbsState(addr))?;
        trace!(addr = %format_args!("{addr:#x}"), %reason, "exploring");

        match self.blocks.locate(addr) {
            Location::BlockStart => {
                if self.explored.get(&addr) == Some(entry) {
                    return Ok(());
                }
                self.propagate(addr)
            }
            Location::Interior {
                region,
                block,
                boundary: true,
            } => self.split(region, block, addr),
            Location::Interior { block, .. } => {
                debug!(
                    addr = %format_args!("{addr:#x}"),
                    block = %format_args!("{block:#x}"),
                    "target is inside an instruction; ignoring"
                );
                Ok(())
            }
            Location::Unexplored => {
                let stop = self.blocks.next_region_start(addr);
                let Some(block) = self.disassemble(addr, stop)? else {
                    return Ok(());
                };
                self.insert_region(BlockRegion::new(addr, vec![block]));
                self.propagate(addr)
            }
        }
    }

    /// Decode and lower one instruction into `builder`.
    ///
    /// Only bytes before `stop` are offered to the decoder, so an instruction
    /// crossing it fails as truncated. A semantics failure leaves the builder
    /// as it was before the call.
    fn lower_instr(
        &self,
        builder: &mut BlockBuilder,
        addr: u64,
        stop: Option<u64>,
    ) -> disco_arch::Result<(u64, Flow)> {
        let mut max = self.arch.max_instr_len();
        if let Some(room) = stop.and_then(|s| usize::try_from(s.saturating_sub(addr)).ok()) {
            max = max.min(room);
        }
        let bytes = self
            .memory
            .code_bytes(addr, max)
            .ok_or(DecodeError::Invalid(addr))?;
        let (instr, len) = self.arch.decode(bytes, addr)?;
        let checkpoint = builder.checkpoint();
        builder.instr_start(addr, len);
        match self.arch.execute(&instr, addr, len, builder) {
            Ok(flow) => Ok((len, flow)),
            Err(err) => {
                builder.rollback(checkpoint);
                Err(err)
            }
        }
    }

    /// Disassemble a straight-line run starting at `addr`.
    ///
    /// Stops after a control transfer, at `stop`, or before an instruction
    /// that fails to decode, lower, or would overlap `stop`. Returns `None`
    /// when the first instruction fails.
    pub(crate) fn disassemble(&mut self, addr: u64, stop: Option<u64>) -> Result<Option<Block>> {
        let ip = self.arch.ip_reg();
        let width = self.arch.addr_width();
        let regs = RegState::initial(self.arch.reg_widths());
        let mut builder = BlockBuilder::new(regs, self.next_assign_id);
        let mut cur = addr;

        let (end, ending) = loop {
            if cur != addr && stop.is_some_and(|s| cur >= s) {
                break (cur, Ending::FallThrough);
            }
            match self.lower_instr(&mut builder, cur, stop) {
                Ok((len, Flow::Next)) => cur = cur.wrapping_add(len),
                Ok((len, Flow::Jump)) => break (cur.wrapping_add(len), Ending::Jump),
                Ok((len, Flow::Branch { cond, taken })) => {
                    break (cur.wrapping_add(len), Ending::Branch { cond, taken });
                }
                Ok((len, Flow::Syscall)) => break (cur.wrapping_add(len), Ending::Syscall),
                Err(err) if cur == addr => {
                    debug!(addr = %format_args!("{addr:#x}"), %err, "cannot disassemble");
                    return Ok(None);
                }
                Err(err) => {
                    trace!(addr = %format_args!("{cur:#x}"), %err, "ending block before failure");
                    break (cur, Ending::FallThrough);
                }
            }
        };

        if matches!(ending, Ending::FallThrough) {
            builder.set_reg(ip, Expr::constant(end, width))?;
        }
        let (stmts, regs, next_id) = builder.finish();
        self.next_assign_id = next_id;
        let term = match ending {
            Ending::FallThrough | Ending::Jump => TermStmt::FetchAndExecute(regs),
            Ending::Branch { cond, taken } => TermStmt::Branch {
                cond,
                taken,
                fallthrough: end,
                regs,
            },
            Ending::Syscall => TermStmt::Syscall(regs),
        };
        Ok(Some(Block {
            label: BlockLabel::new(addr, 0),
            addr,
            size: end - addr,
            stmts,
            term,
        }))
    }

    /// Split the block at `block` (in region `region`) at instruction `at`.
    fn split(&mut self, region: u64, block: u64, at: u64) -> Result<()> {
        let old_region = self
            .blocks
            .take(region)
            .ok_or_else(|| DiscoveryError::Unreachable(format!("no region at {region:#x}")))?;
        let Some(old) = old_region.block_at(block).cloned() else {
            self.insert_region(old_region);
            return Err(DiscoveryError::Unreachable(format!("no block at {block:#x}")));
        };

        let prefix = self.disassemble(old.addr, Some(at))?;
        let tail = self.disassemble(at, Some(old.end()))?;
        let (Some(prefix), Some(tail)) = (prefix, tail) else {
            warn!(
                block = %format_args!("{block:#x}"),
                at = %format_args!("{at:#x}"),
                "re-disassembly failed; block not split"
            );
            self.insert_region(old_region);
            return Ok(());
        };
        if prefix.end() != at || tail.end() != old.end() {
            warn!(
                block = %format_args!("{block:#x}"),
                at = %format_args!("{at:#x}"),
                "re-disassembly disagrees with the original block; not split"
            );
            self.insert_region(old_region);
            return Ok(());
        }

        let mut blocks: Vec<Block> = old_region
            .blocks
            .into_iter()
            .filter(|b| b.addr != old.addr)
            .collect();
        blocks.push(prefix);
        blocks.push(tail);
        self.insert_region(BlockRegion::new(region, blocks));
        debug!(
            region = %format_args!("{region:#x}"),
            at = %format_args!("{at:#x}"),
            "split block"
        );

        self.explored.remove(&old.addr);
        self.propagate(old.addr)?;
        self.push_block(at, FrontierReason::SplitAt(region));
        Ok(())
    }

    /// Push the exit state of the block at `addr` to its successors.
    pub(crate) fn propagate(&mut self, addr: u64) -> Result<()> {
        let block = self
            .blocks
            .block(addr)
            .cloned()
            .ok_or_else(|| DiscoveryError::Unreachable(format!("no block at {addr:#x}")))?;
        let entry = self
            .abs_states
            .get(&addr)
            .cloned()
            .ok_or(DiscoveryError::MissingAbsState(addr))?;
        let parsed = classify_block(self, &block)?;

        let (exit, written) = {
            let transfer = BlockTransfer::run(&self.memory, self.arch.addr_width(), &entry, &block);
            let exit = transfer.exit_state(block.term.regs());
            (exit, self.written_code_pointers(&transfer, &block))
        };
        self.explored.insert(addr, entry);

        for (dest, pointer) in written {
            self.push_function(pointer, FrontierReason::InWrite(addr));
            if let Some(dest) = dest {
                self.record_global(dest, GlobalDataInfo::ReferencedValue);
            }
        }

        match parsed.term {
            ParsedTerm::Branch {
                taken, fallthrough, ..
            } => {
                self.flow_to(addr, taken, exit.clone());
                self.flow_to(addr, fallthrough, exit);
            }
            ParsedTerm::Call {
                target,
                return_addr,
            } => {
                if let CallTarget::Direct(target) = target {
                    self.push_code_function(target, FrontierReason::NextIp(addr));
                }
                let after = self.post_call_state(&exit);
                if self.memory.is_code_address(return_addr) {
                    let after = self.with_ip(after, return_addr);
                    self.add_edge(addr, return_addr);
                    self.merge_state(return_addr, &after, FrontierReason::ReturnAddress(addr));
                }
            }
            ParsedTerm::Jump { target } => self.flow_to(addr, target, exit),
            ParsedTerm::Return => {}
            ParsedTerm::TailCall { target } => {
                self.push_code_function(target, FrontierReason::NextIp(addr));
                self.after_tail_call(&block);
            }
            ParsedTerm::IndirectTailCall { .. } => self.after_tail_call(&block),
            ParsedTerm::JumpTable { base, end, targets } => {
                self.record_global(base, GlobalDataInfo::JumpTable(Some(end)));
                for target in targets {
                    self.flow_to(addr, target, exit.clone());
                }
            }
            ParsedTerm::Syscall { results, next, .. } => {
                let mut state = exit;
                for reg in results {
                    state.set_reg(reg, AbsValue::Top);
                }
                self.flow_to(addr, next, state);
            }
        }
        Ok(())
    }

    fn with_ip(&self, mut state: AbsBlockState, target: u64) -> AbsBlockState {
        state.set_reg(self.arch.ip_reg(), AbsValue::code_pointers(vec![target]));
        state
    }

    /// Merge `state` into an intra-procedural successor.
    fn flow_to(&mut self, from: u64, target: u64, state: AbsBlockState) {
        if !self.memory.is_code_address(target) {
            trace!(
                from = %format_args!("{from:#x}"),
                target = %format_args!("{target:#x}"),
                "successor is not code"
            );
            return;
        }
        let state = self.with_ip(state, target);
        self.add_edge(from, target);
        self.merge_state(target, &state, FrontierReason::NextIp(from));
    }

    fn push_code_function(&mut self, addr: u64, reason: FrontierReason) {
        if self.memory.is_code_address(addr) {
            self.push_function(addr, reason);
        }
    }

    /// Code after a tail call is probably the start of another function.
    fn after_tail_call(&mut self, block: &Block) {
        let next = block.end();
        if self.memory.is_code_address(next) && !self.abs_states.contains_key(&next) {
            self.push_function(next, FrontierReason::NextIp(block.addr));
        }
    }

    /// State at the return address of a call, given the state at the call.
    ///
    /// Callee-saved registers survive, the stack pointer pops the return
    /// address, and only stack slots at or above it are kept.
    fn post_call_state(&self, exit: &AbsBlockState) -> AbsBlockState {
        let mut state = exit.clone();
        let saved = self.arch.callee_saved_regs();
        for idx in 0..self.num_regs() {
            let reg = Reg(u16::try_from(idx).unwrap_or(u16::MAX));
            if !saved.contains(&reg) {
                state.set_reg(reg, AbsValue::Top);
            }
        }

        let sp_reg = self.arch.sp_reg();
        let delta = AbsValue::constant(self.arch.call_stack_delta().cast_unsigned());
        let width = self.arch.addr_width();
        let sp = AbsValue::apply_binary(BinaryOp::Add, exit.reg(sp_reg), &delta, width);
        match sp.as_stack() {
            Some((base, floor)) => state.retain_slots(|(b, off)| b == base && off >= floor),
            None => state.retain_slots(|_| false),
        }
        state.set_reg(sp_reg, sp);
        state
    }

    /// Code-pointer constants stored outside the stack by `block`.
    ///
    /// Returns the concrete destination, if known, and the pointer.
    fn written_code_pointers(
        &self,
        transfer: &BlockTransfer<'_>,
        block: &Block,
    ) -> Vec<(Option<u64>, u64)> {
        let sp = self.arch.sp_reg();
        let ptr_width = self.arch.addr_width();
        block
            .stmts
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::WriteMem { addr, value } if value.width() == ptr_width => {
                    let pointer = value
                        .as_const()
                        .filter(|v| self.memory.is_code_address(*v))?;
                    let stack_based =
                        matches!(addr.split_offset().0, Expr::Initial { reg, .. } if *reg == sp);
                    let dest = transfer.eval(addr);
                    if stack_based || matches!(dest, AbsValue::StackOffset { .. }) {
                        return None;
                    }
                    Some((dest.as_single(), pointer))
                }
                _ => None,
            })
            .collect()
    }

    /// Queue code pointers found in read-only data, with an unknown state.
    fn scan_static_data(&mut self) {
        let _span = trace_span!("scan_static_data").entered();
        let ptr_bytes = self.arch.ptr_bytes();
        let Ok(size) = usize::try_from(ptr_bytes) else {
            return;
        };
        let mut found = Vec::new();
        for segment in self.memory.read_only_segments() {
            let mut addr = segment.start.next_multiple_of(ptr_bytes);
            while addr.saturating_add(ptr_bytes) <= segment.end {
                if let Ok(value) = self.memory.read_word(addr, size)
                    && self.memory.is_code_address(value)
                {
                    found.push(value);
                }
                addr += ptr_bytes;
            }
        }

        debug!(pointers = found.len(), "code pointers in static data");
        let top = AbsBlockState::top(self.num_regs());
        for addr in found {
            if !self.abs_states.contains_key(&addr) {
                self.set_abs_state(addr, top.clone());
                self.push_block(addr, FrontierReason::InData);
            }
        }
    }
}
