//! Register state and raw block terminators.

use crate::expr::{Expr, Reg};
use crate::width::Width;
use crate::{Result, WidthError};

/// Symbolic value of every architecture register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegState {
    values: Vec<Expr>,
}

impl RegState {
    /// Registers holding their block-entry values.
    pub fn initial(widths: &[Width]) -> Self {
        let values = widths
            .iter()
            .enumerate()
            .map(|(idx, &width)| {
                let reg = Reg(u16::try_from(idx).unwrap_or(u16::MAX));
                Expr::initial(reg, width)
            })
            .collect();
        Self { values }
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Current value of `reg`.
    pub fn get(&self, reg: Reg) -> Result<&Expr> {
        self.values
            .get(reg.index())
            .ok_or(WidthError::BadRegister(reg.0))
    }

    /// Overwrite `reg`; the new value must keep the register's width.
    pub fn set(&mut self, reg: Reg, value: Expr) -> Result<()> {
        let slot = self
            .values
            .get_mut(reg.index())
            .ok_or(WidthError::BadRegister(reg.0))?;
        slot.width().expect(value.width())?;
        *slot = value;
        Ok(())
    }

    /// Iterate over `(register, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Reg, &Expr)> {
        self.values
            .iter()
            .enumerate()
            .map(|(idx, value)| (Reg(u16::try_from(idx).unwrap_or(u16::MAX)), value))
    }
}

/// Raw terminator produced by disassembly, before classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermStmt {
    /// Continue at whatever the instruction pointer holds.
    FetchAndExecute(RegState),
    /// Conditional branch; both successors are concrete.
    Branch {
        cond: Expr,
        taken: u64,
        fallthrough: u64,
        regs: RegState,
    },
    /// System call; the instruction pointer holds the address after it.
    Syscall(RegState),
}

impl TermStmt {
    /// Final register state.
    pub const fn regs(&self) -> &RegState {
        match self {
            Self::FetchAndExecute(regs) | Self::Syscall(regs) => regs,
            Self::Branch { regs, .. } => regs,
        }
    }

    /// Check if this terminator is a conditional branch.
    pub const fn is_branch(&self) -> bool {
        matches!(self, Self::Branch { .. })
    }

    /// Check if this terminator is a system call.
    pub const fn is_syscall(&self) -> bool {
        matches!(self, Self::Syscall(_))
    }
}
