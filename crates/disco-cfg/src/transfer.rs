//! Abstract interpretation of a single block.

use disco_ir::{AssignId, AssignRhs, Block, Expr, RegState, Stmt, Width};
use disco_mem::Memory;
use rustc_hash::FxHashMap;

use crate::abs_state::{AbsBlockState, StackSlot};
use crate::value::AbsValue;

/// Abstract effect of one block, evaluated from its entry state.
pub struct BlockTransfer<'a> {
    memory: &'a Memory,
    ptr_width: Width,
    entry: &'a AbsBlockState,
    assigned: FxHashMap<AssignId, AbsValue>,
    /// Entry state with the block's stack writes applied.
    state: AbsBlockState,
}

impl<'a> BlockTransfer<'a> {
    /// Run the statements of `block` starting from `entry`.
    pub fn run(
        memory: &'a Memory,
        ptr_width: Width,
        entry: &'a AbsBlockState,
        block: &Block,
    ) -> Self {
        let mut transfer = Self {
            memory,
            ptr_width,
            entry,
            assigned: FxHashMap::default(),
            state: entry.clone(),
        };
        for stmt in &block.stmts {
            transfer.step(stmt);
        }
        transfer
    }

    fn step(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { id, rhs } => {
                let value = match rhs {
                    AssignRhs::Eval(expr) => self.eval(expr),
                    AssignRhs::ReadMem { addr, width } => self.load(addr, *width),
                };
                self.assigned.insert(*id, value);
            }
            Stmt::WriteMem { addr, value } => {
                let addr = self.eval(addr);
                if let AbsValue::StackOffset { base, offsets } = &addr {
                    let bytes = value.width().bytes();
                    for offset in offsets {
                        self.state.clobber((*base, *offset), bytes);
                    }
                    if let [offset] = offsets.as_slice() {
                        let slot = StackSlot {
                            width: value.width(),
                            value: self.eval(value),
                        };
                        self.state.set_slot((*base, *offset), slot);
                    }
                }
                // Writes through unknown or global addresses leave the
                // tracked stack alone.
            }
            Stmt::InstrStart { .. } | Stmt::ArchStmt { .. } | Stmt::Comment(_) => {}
        }
    }

    fn load(&self, addr: &Expr, width: Width) -> AbsValue {
        let addr = self.eval(addr);
        if let Some(slot_addr) = addr.as_stack() {
            return match self.state.slot(slot_addr) {
                Some(slot) if slot.width == width => slot.value.clone(),
                _ => AbsValue::Top,
            };
        }
        let Some(addr) = addr.as_single() else {
            return AbsValue::Top;
        };
        let Ok(size) = usize::try_from(width.bytes()) else {
            return AbsValue::Top;
        };
        self.memory
            .read_readonly_word(addr, size)
            .map_or(AbsValue::Top, |value| self.tag(value, width))
    }

    fn tag(&self, value: u64, width: Width) -> AbsValue {
        if width == self.ptr_width && self.memory.is_code_address(value) {
            AbsValue::code_pointers(vec![value])
        } else {
            AbsValue::constant(value)
        }
    }

    /// Abstract value of `expr` over the block's entry state and assignments.
    pub fn eval(&self, expr: &Expr) -> AbsValue {
        match expr {
            Expr::Const { value, width } => self.tag(*value, *width),
            Expr::Initial { reg, .. } => self.entry.reg(*reg).clone(),
            Expr::Assigned { id, .. } => self.assigned.get(id).cloned().unwrap_or_default(),
            Expr::Undef(_) => AbsValue::Top,
            Expr::Unary { op, arg, width } => self.eval(arg).apply_unary(*op, arg.width(), *width),
            Expr::Binary {
                op, left, right, ..
            } => AbsValue::apply_binary(*op, &self.eval(left), &self.eval(right), left.width()),
            Expr::Ite {
                cond,
                then_val,
                else_val,
                ..
            } => match self.eval(cond).values() {
                Some(bits) if bits.iter().all(|b| *b != 0) => self.eval(then_val),
                Some(bits) if bits.iter().all(|b| *b == 0) => self.eval(else_val),
                _ => self.eval(then_val).join(&self.eval(else_val)),
            },
        }
    }

    /// State after the block, given its final register expressions.
    pub fn exit_state(&self, regs: &RegState) -> AbsBlockState {
        let mut exit = self.state.clone();
        for (reg, expr) in regs.iter() {
            exit.set_reg(reg, self.eval(expr));
        }
        exit
    }
}
