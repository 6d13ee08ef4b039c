//! Basic block IR.

use std::fmt;

use crate::stmt::Stmt;
use crate::terminator::TermStmt;

/// Identifies a block: the region it was disassembled in and its position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockLabel {
    /// Start address of the owning region.
    pub parent: u64,
    /// Dense sub-index within the region, starting at 0.
    pub index: u32,
}

impl BlockLabel {
    pub const fn new(parent: u64, index: u32) -> Self {
        Self { parent, index }
    }
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block_{:x}_{}", self.parent, self.index)
    }
}

/// Straight-line statements ending in a terminator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub label: BlockLabel,
    /// Address of the first instruction.
    pub addr: u64,
    /// Size of the covered code in bytes.
    pub size: u64,
    pub stmts: Vec<Stmt>,
    pub term: TermStmt,
}

impl Block {
    /// End address (exclusive).
    pub const fn end(&self) -> u64 {
        self.addr + self.size
    }

    /// Check if `addr` lies within the block.
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.addr && addr < self.end()
    }

    /// Addresses of the instructions in the block.
    pub fn instr_addrs(&self) -> impl Iterator<Item = u64> + '_ {
        self.stmts.iter().filter_map(|stmt| match stmt {
            Stmt::InstrStart { addr, .. } => Some(*addr),
            _ => None,
        })
    }

    /// Check if an instruction starts exactly at `addr`.
    pub fn is_instr_boundary(&self, addr: u64) -> bool {
        self.instr_addrs().any(|a| a == addr)
    }

    /// Number of instructions.
    pub fn instr_count(&self) -> usize {
        self.instr_addrs().count()
    }
}
