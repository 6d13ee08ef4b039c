//! Block builder used by instruction semantics.

use crate::expr::{AssignId, Expr, Reg};
use crate::stmt::{AssignRhs, Stmt};
use crate::terminator::RegState;
use crate::width::Width;
use crate::Result;

/// Saved builder position for undoing a partially lowered instruction.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    stmts: usize,
    regs: RegState,
    next_id: u64,
}

/// Accumulates statements and the symbolic register state of a block.
///
/// Instruction semantics read and write registers through the builder and
/// emit memory effects as statements. Assignment ids come from a counter the
/// caller threads through every block so they stay unique across a run.
#[derive(Clone, Debug)]
pub struct BlockBuilder {
    regs: RegState,
    stmts: Vec<Stmt>,
    next_id: u64,
}

impl BlockBuilder {
    /// Start a block with the given register state and first free assignment id.
    pub const fn new(regs: RegState, next_id: u64) -> Self {
        Self {
            regs,
            stmts: Vec::new(),
            next_id,
        }
    }

    /// Current value of a register.
    pub fn reg(&self, reg: Reg) -> Result<Expr> {
        self.regs.get(reg).cloned()
    }

    /// Overwrite a register.
    pub fn set_reg(&mut self, reg: Reg, value: Expr) -> Result<()> {
        self.regs.set(reg, value)
    }

    /// Current register state.
    pub const fn regs(&self) -> &RegState {
        &self.regs
    }

    /// Statements emitted so far.
    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    fn fresh_id(&mut self) -> AssignId {
        let id = AssignId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Record the start of an instruction.
    pub fn instr_start(&mut self, addr: u64, len: u64) {
        self.stmts.push(Stmt::InstrStart { addr, len });
    }

    /// Load from memory; returns the loaded value.
    pub fn read_mem(&mut self, addr: Expr, width: Width) -> Expr {
        let id = self.fresh_id();
        self.stmts.push(Stmt::Assign {
            id,
            rhs: AssignRhs::ReadMem { addr, width },
        });
        Expr::assigned(id, width)
    }

    /// Store `value` at `addr`.
    pub fn write_mem(&mut self, addr: Expr, value: Expr) {
        self.stmts.push(Stmt::write_mem(addr, value));
    }

    /// Name an expression so later uses share it.
    pub fn assign(&mut self, expr: Expr) -> Expr {
        if matches!(
            expr,
            Expr::Const { .. } | Expr::Initial { .. } | Expr::Assigned { .. } | Expr::Undef(_)
        ) {
            return expr;
        }
        let width = expr.width();
        let id = self.fresh_id();
        self.stmts.push(Stmt::Assign {
            id,
            rhs: AssignRhs::Eval(expr),
        });
        Expr::assigned(id, width)
    }

    /// Emit an architecture-specific statement.
    pub fn arch_stmt(&mut self, name: &str, args: Vec<Expr>) {
        self.stmts.push(Stmt::arch(name, args));
    }

    /// Emit a comment.
    pub fn comment(&mut self, text: impl Into<String>) {
        self.stmts.push(Stmt::Comment(text.into()));
    }

    /// Remember the current position.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            stmts: self.stmts.len(),
            regs: self.regs.clone(),
            next_id: self.next_id,
        }
    }

    /// Drop everything emitted since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.stmts.truncate(checkpoint.stmts);
        self.regs = checkpoint.regs;
        self.next_id = checkpoint.next_id;
    }

    /// Next unused assignment id.
    pub const fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Finish building: statements, final registers and next free id.
    pub fn finish(self) -> (Vec<Stmt>, RegState, u64) {
        (self.stmts, self.regs, self.next_id)
    }
}
