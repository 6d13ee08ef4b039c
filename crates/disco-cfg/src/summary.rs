//! Per-function summaries for downstream tooling.

use std::collections::BTreeMap;

use disco_arch::Architecture;
use disco_ir::{AssignRhs, Expr, Stmt, Width};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classify::classify_block;
use crate::error::{DiscoveryError, Result};
use crate::state::DiscoveryState;
use crate::transfer::BlockTransfer;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub addr: u64,
    pub size: u64,
}

/// A stack slot below the frame base (a local variable).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocaSlot {
    /// Offset from the stack pointer at function entry.
    pub offset: i64,
    pub size: u64,
}

/// What discovery learned about one function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub entry: u64,
    pub name: Option<String>,
    pub blocks: Vec<BlockSummary>,
    /// Bytes of stack used below the entry stack pointer.
    pub stack_frame_size: u64,
    pub allocas: Vec<AllocaSlot>,
}

/// Memory accesses of a statement list: address and width.
fn accesses(stmts: &[Stmt]) -> impl Iterator<Item = (&Expr, Width)> {
    stmts.iter().filter_map(|stmt| match stmt {
        Stmt::WriteMem { addr, value } => Some((addr, value.width())),
        Stmt::Assign {
            rhs: AssignRhs::ReadMem { addr, width },
            ..
        } => Some((addr, *width)),
        _ => None,
    })
}

fn summarize_function<A: Architecture>(
    state: &DiscoveryState<A>,
    entry: u64,
) -> Result<FunctionSummary> {
    let mut blocks = Vec::new();
    let mut slots: BTreeMap<i64, u64> = BTreeMap::new();

    for block in state.blocks.blocks() {
        if state.functions.owner(block.addr) != Some(entry) {
            continue;
        }
        blocks.push(BlockSummary {
            addr: block.addr,
            size: block.size,
        });

        let abs = state
            .abs_states
            .get(&block.addr)
            .ok_or(DiscoveryError::MissingAbsState(block.addr))?;
        // Classified statements: call pushes and return pops are not locals.
        let parsed = classify_block(state, block)?;
        let transfer = BlockTransfer::run(&state.memory, state.arch.addr_width(), abs, block);
        for (addr, width) in accesses(&parsed.stmts) {
            if let Some((base, offset)) = transfer.eval(addr).as_stack()
                && base == entry
                && offset < 0
            {
                let size = slots.entry(offset).or_default();
                *size = (*size).max(width.bytes());
            }
        }
    }

    let stack_frame_size = slots.keys().map(|offset| offset.unsigned_abs()).max().unwrap_or(0);
    Ok(FunctionSummary {
        entry,
        name: state.symbols.get(&entry).cloned(),
        blocks,
        stack_frame_size,
        allocas: slots
            .into_iter()
            .map(|(offset, size)| AllocaSlot { offset, size })
            .collect(),
    })
}

/// Summarize every function of a settled state.
pub fn summarize<A: Architecture>(state: &DiscoveryState<A>) -> Result<Vec<FunctionSummary>> {
    let entries: Vec<u64> = state.functions.iter().collect();
    entries
        .par_iter()
        .map(|entry| summarize_function(state, *entry))
        .collect()
}
