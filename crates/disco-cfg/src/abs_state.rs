//! Abstract machine state at block entry.

use std::collections::BTreeMap;

use disco_ir::{Reg, Width};

use crate::value::AbsValue;

static TOP: AbsValue = AbsValue::Top;

/// Location of a stack slot: frame base (function entry) and byte offset
/// from the stack pointer at that entry.
pub type StackAddr = (u64, i64);

/// A tracked stack slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackSlot {
    pub width: Width,
    pub value: AbsValue,
}

impl StackSlot {
    /// Check if this slot at `offset` overlaps `[other, other + bytes)`.
    pub const fn overlaps(&self, offset: i64, other: i64, bytes: u64) -> bool {
        let size = self.width.bytes().cast_signed();
        offset < other.wrapping_add(bytes.cast_signed()) && other < offset.wrapping_add(size)
    }
}

/// Abstract registers plus tracked stack slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbsBlockState {
    regs: Vec<AbsValue>,
    stack: BTreeMap<StackAddr, StackSlot>,
}

impl AbsBlockState {
    /// State where nothing is known.
    pub fn top(num_regs: usize) -> Self {
        Self {
            regs: vec![AbsValue::Top; num_regs],
            stack: BTreeMap::new(),
        }
    }

    /// State at entry to the function starting at `entry`.
    ///
    /// The stack pointer is the frame base itself and the slot it points to
    /// holds the caller's return address.
    pub fn function_entry(num_regs: usize, sp: Reg, ip: Reg, entry: u64, ptr_width: Width) -> Self {
        let mut state = Self::top(num_regs);
        state.set_reg(sp, AbsValue::stack(entry, 0));
        state.set_reg(ip, AbsValue::code_pointers(vec![entry]));
        state.set_slot(
            (entry, 0),
            StackSlot {
                width: ptr_width,
                value: AbsValue::ReturnAddr,
            },
        );
        state
    }

    pub fn reg(&self, reg: Reg) -> &AbsValue {
        self.regs.get(reg.index()).unwrap_or(&TOP)
    }

    pub fn set_reg(&mut self, reg: Reg, value: AbsValue) {
        if let Some(slot) = self.regs.get_mut(reg.index()) {
            *slot = value;
        }
    }

    pub fn regs(&self) -> &[AbsValue] {
        &self.regs
    }

    pub const fn stack(&self) -> &BTreeMap<StackAddr, StackSlot> {
        &self.stack
    }

    pub fn slot(&self, addr: StackAddr) -> Option<&StackSlot> {
        self.stack.get(&addr)
    }

    pub fn set_slot(&mut self, addr: StackAddr, slot: StackSlot) {
        self.stack.insert(addr, slot);
    }

    /// Forget every slot overlapping `bytes` bytes at `addr`.
    pub fn clobber(&mut self, (base, offset): StackAddr, bytes: u64) {
        self.stack
            .retain(|&(b, o), slot| b != base || !slot.overlaps(o, offset, bytes));
    }

    /// Keep only the slots for which `keep` returns true.
    pub fn retain_slots(&mut self, mut keep: impl FnMut(StackAddr) -> bool) {
        self.stack.retain(|addr, _| keep(*addr));
    }

    fn merge_with(
        &mut self,
        other: &Self,
        merge: impl Fn(&AbsValue, &AbsValue) -> AbsValue,
    ) -> bool {
        let mut changed = false;
        for (mine, theirs) in self.regs.iter_mut().zip(&other.regs) {
            let merged = merge(mine, theirs);
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        let before = self.stack.len();
        self.stack.retain(|addr, slot| {
            other
                .stack
                .get(addr)
                .is_some_and(|theirs| theirs.width == slot.width)
        });
        changed |= self.stack.len() != before;
        for (addr, slot) in &mut self.stack {
            if let Some(theirs) = other.stack.get(addr) {
                let merged = merge(&slot.value, &theirs.value);
                if merged != slot.value {
                    slot.value = merged;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Join `other` into `self`. Returns true if anything changed.
    pub fn join_from(&mut self, other: &Self) -> bool {
        self.merge_with(other, AbsValue::join)
    }

    /// Widen `self` by `other`. Returns true if anything changed.
    pub fn widen_from(&mut self, other: &Self) -> bool {
        self.merge_with(other, AbsValue::widen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SP: Reg = Reg(0);
    const IP: Reg = Reg(1);

    #[test]
    fn test_function_entry_state() {
        let state = AbsBlockState::function_entry(2, SP, IP, 0x1000, Width::W64);
        assert_eq!(state.reg(SP).as_stack(), Some((0x1000, 0)));
        assert_eq!(state.reg(IP).as_single(), Some(0x1000));
        assert_eq!(state.slot((0x1000, 0)).unwrap().value, AbsValue::ReturnAddr);
        assert!(state.reg(Reg(9)).is_top());
    }

    #[test]
    fn test_join_intersects_slots() {
        let mut a = AbsBlockState::top(2);
        let mut b = AbsBlockState::top(2);
        let slot = |v| StackSlot {
            width: Width::W64,
            value: AbsValue::constant(v),
        };
        a.set_slot((0x1000, -8), slot(1));
        a.set_slot((0x1000, -16), slot(2));
        b.set_slot((0x1000, -8), slot(3));
        assert!(a.join_from(&b));
        assert_eq!(a.stack().len(), 1);
        assert_eq!(
            a.slot((0x1000, -8)).unwrap().value,
            AbsValue::FinSet(vec![1, 3])
        );
        assert!(!a.join_from(&b));
    }

    #[test]
    fn test_clobber_overlapping() {
        let mut state = AbsBlockState::top(1);
        let slot = StackSlot {
            width: Width::W64,
            value: AbsValue::Top,
        };
        state.set_slot((0x1000, -16), slot.clone());
        state.set_slot((0x1000, -8), slot.clone());
        state.set_slot((0x2000, -8), slot);
        state.clobber((0x1000, -12), 4);
        assert!(state.slot((0x1000, -16)).is_none());
        assert!(state.slot((0x1000, -8)).is_some());
        assert!(state.slot((0x2000, -8)).is_some());
    }
}
