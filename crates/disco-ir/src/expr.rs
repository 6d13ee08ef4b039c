//! Expression IR.
//!
//! Expressions are pure bit-vector terms over the register values at block
//! entry and the results of earlier assignments. Constructors fold constants
//! and normalize `x - c` into `x + (-c)` so that address arithmetic has one
//! canonical shape.

use std::fmt;

use crate::width::Width;
use crate::{Result, WidthError};

/// Architecture register index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reg(pub u16);

impl Reg {
    /// Index into per-register tables.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of an assignment statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssignId(pub u64);

impl fmt::Display for AssignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Unary operations. Casts take their target width from the expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Trunc,
    ZExt,
    SExt,
}

impl UnaryOp {
    /// Evaluate on a concrete value of width `from`, producing width `to`.
    pub const fn apply(self, value: u64, from: Width, to: Width) -> u64 {
        let value = from.truncate(value);
        let raw = match self {
            Self::Not => !value,
            Self::Neg => value.wrapping_neg(),
            Self::Trunc | Self::ZExt => value,
            Self::SExt => from.sign_extend(value).cast_unsigned(),
        };
        to.truncate(raw)
    }
}

/// Binary operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Lshr,
    Ashr,
    Eq,
    Ult,
    Slt,
}

impl BinaryOp {
    /// Comparisons produce a single bit.
    pub const fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ult | Self::Slt)
    }

    /// Shifts allow the amount to have a different width than the operand.
    pub const fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::Lshr | Self::Ashr)
    }

    /// Evaluate on concrete operands of width `width`.
    pub const fn apply(self, left: u64, right: u64, width: Width) -> u64 {
        let l = width.truncate(left);
        let r = width.truncate(right);
        let bits = width.bits() as u64;
        let raw = match self {
            Self::Add => l.wrapping_add(r),
            Self::Sub => l.wrapping_sub(r),
            Self::Mul => l.wrapping_mul(r),
            Self::And => l & r,
            Self::Or => l | r,
            Self::Xor => l ^ r,
            Self::Shl => {
                if right >= bits {
                    0
                } else {
                    l << right
                }
            }
            Self::Lshr => {
                if right >= bits {
                    0
                } else {
                    l >> right
                }
            }
            Self::Ashr => {
                let signed = width.sign_extend(l);
                let amount = if right >= bits { bits - 1 } else { right };
                (signed >> amount).cast_unsigned()
            }
            Self::Eq => return (l == r) as u64,
            Self::Ult => return (l < r) as u64,
            Self::Slt => return (width.sign_extend(l) < width.sign_extend(r)) as u64,
        };
        width.truncate(raw)
    }
}

/// Expression tree node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Literal, already truncated to its width.
    Const { value: u64, width: Width },
    /// Register value at block entry.
    Initial { reg: Reg, width: Width },
    /// Result of an earlier assignment in the same block.
    Assigned { id: AssignId, width: Width },
    /// Architecturally undefined value.
    Undef(Width),
    Unary {
        op: UnaryOp,
        arg: Box<Self>,
        width: Width,
    },
    Binary {
        op: BinaryOp,
        left: Box<Self>,
        right: Box<Self>,
        width: Width,
    },
    Ite {
        cond: Box<Self>,
        then_val: Box<Self>,
        else_val: Box<Self>,
        width: Width,
    },
}

impl Expr {
    /// Create a constant, truncating `value` to `width`.
    pub const fn constant(value: u64, width: Width) -> Self {
        Self::Const {
            value: width.truncate(value),
            width,
        }
    }

    /// Create a signed constant.
    pub const fn signed(value: i64, width: Width) -> Self {
        Self::constant(value.cast_unsigned(), width)
    }

    /// Boolean constant.
    pub const fn bool(value: bool) -> Self {
        Self::constant(value as u64, Width::W1)
    }

    /// Register value at block entry.
    pub const fn initial(reg: Reg, width: Width) -> Self {
        Self::Initial { reg, width }
    }

    /// Reference to an assignment result.
    pub const fn assigned(id: AssignId, width: Width) -> Self {
        Self::Assigned { id, width }
    }

    /// Undefined value.
    pub const fn undef(width: Width) -> Self {
        Self::Undef(width)
    }

    /// Width of this expression.
    pub const fn width(&self) -> Width {
        match self {
            Self::Const { width, .. }
            | Self::Initial { width, .. }
            | Self::Assigned { width, .. }
            | Self::Unary { width, .. }
            | Self::Binary { width, .. }
            | Self::Ite { width, .. } => *width,
            Self::Undef(width) => *width,
        }
    }

    /// Literal value, if this is a constant.
    pub const fn as_const(&self) -> Option<u64> {
        match self {
            Self::Const { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Assignment referenced by this expression, if any.
    pub const fn as_assigned(&self) -> Option<AssignId> {
        match self {
            Self::Assigned { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Split `base + c` into `(base, c)` with `c` read as signed.
    ///
    /// Expressions that are not an addition of a constant return an offset of 0.
    pub fn split_offset(&self) -> (&Self, i64) {
        match self {
            Self::Binary {
                op: BinaryOp::Add,
                left,
                right,
                width,
            } => match right.as_const() {
                Some(c) => {
                    let (base, off) = left.split_offset();
                    (base, off.wrapping_add(width.sign_extend(c)))
                }
                None => (self, 0),
            },
            _ => (self, 0),
        }
    }

    fn unary_node(op: UnaryOp, arg: Self, width: Width) -> Self {
        if let Some(c) = arg.as_const() {
            return Self::constant(op.apply(c, arg.width(), width), width);
        }
        Self::Unary {
            op,
            arg: Box::new(arg),
            width,
        }
    }

    fn binary_node(op: BinaryOp, left: Self, right: Self) -> Result<Self> {
        let width = left.width();
        if !op.is_shift() {
            width.expect(right.width())?;
        }
        if let (Some(l), Some(r)) = (left.as_const(), right.as_const()) {
            let out = if op.is_comparison() { Width::W1 } else { width };
            return Ok(Self::constant(op.apply(l, r, width), out));
        }
        let out = if op.is_comparison() { Width::W1 } else { width };
        Ok(Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            width: out,
        })
    }

    /// Bitwise complement.
    #[must_use]
    pub fn not(arg: Self) -> Self {
        if let Self::Unary {
            op: UnaryOp::Not,
            arg: inner,
            ..
        } = arg
        {
            return *inner;
        }
        let width = arg.width();
        Self::unary_node(UnaryOp::Not, arg, width)
    }

    /// Two's complement negation.
    #[must_use]
    pub fn neg(arg: Self) -> Self {
        let width = arg.width();
        Self::unary_node(UnaryOp::Neg, arg, width)
    }

    /// Truncate to a narrower width.
    pub fn trunc(arg: Self, to: Width) -> Result<Self> {
        let from = arg.width();
        if to == from {
            return Ok(arg);
        }
        if to > from {
            return Err(WidthError::InvalidCast {
                from: from.bits(),
                to: to.bits(),
            });
        }
        if let Self::Unary {
            op: UnaryOp::ZExt | UnaryOp::SExt,
            arg: inner,
            ..
        } = &arg
            && inner.width() == to
        {
            return Ok(*inner.clone());
        }
        Ok(Self::unary_node(UnaryOp::Trunc, arg, to))
    }

    /// Zero-extend to a wider width.
    pub fn zext(arg: Self, to: Width) -> Result<Self> {
        Self::extend(UnaryOp::ZExt, arg, to)
    }

    /// Sign-extend to a wider width.
    pub fn sext(arg: Self, to: Width) -> Result<Self> {
        Self::extend(UnaryOp::SExt, arg, to)
    }

    fn extend(op: UnaryOp, arg: Self, to: Width) -> Result<Self> {
        let from = arg.width();
        if to == from {
            return Ok(arg);
        }
        if to < from {
            return Err(WidthError::InvalidCast {
                from: from.bits(),
                to: to.bits(),
            });
        }
        Ok(Self::unary_node(op, arg, to))
    }

    pub fn add(left: Self, right: Self) -> Result<Self> {
        left.width().expect(right.width())?;
        // Keep constants on the right and fold chains of constant offsets.
        let (left, right) = if left.as_const().is_some() && right.as_const().is_none() {
            (right, left)
        } else {
            (left, right)
        };
        if right.as_const() == Some(0) {
            return Ok(left);
        }
        if let (
            Self::Binary {
                op: BinaryOp::Add,
                left: inner,
                right: inner_c,
                width,
            },
            Some(c),
        ) = (&left, right.as_const())
            && let Some(ic) = inner_c.as_const()
        {
            let folded = Self::constant(ic.wrapping_add(c), *width);
            return Self::add(*inner.clone(), folded);
        }
        Self::binary_node(BinaryOp::Add, left, right)
    }

    pub fn sub(left: Self, right: Self) -> Result<Self> {
        left.width().expect(right.width())?;
        if left == right && !matches!(left, Self::Undef(_)) {
            return Ok(Self::constant(0, left.width()));
        }
        if let Some(c) = right.as_const() {
            let width = right.width();
            return Self::add(left, Self::constant(c.wrapping_neg(), width));
        }
        Self::binary_node(BinaryOp::Sub, left, right)
    }

    pub fn mul(left: Self, right: Self) -> Result<Self> {
        if right.as_const() == Some(1) {
            left.width().expect(right.width())?;
            return Ok(left);
        }
        Self::binary_node(BinaryOp::Mul, left, right)
    }

    pub fn and(left: Self, right: Self) -> Result<Self> {
        let mask = left.width().mask();
        if right.as_const() == Some(mask) {
            left.width().expect(right.width())?;
            return Ok(left);
        }
        if left == right {
            return Ok(left);
        }
        Self::binary_node(BinaryOp::And, left, right)
    }

    pub fn or(left: Self, right: Self) -> Result<Self> {
        if right.as_const() == Some(0) {
            left.width().expect(right.width())?;
            return Ok(left);
        }
        Self::binary_node(BinaryOp::Or, left, right)
    }

    pub fn xor(left: Self, right: Self) -> Result<Self> {
        left.width().expect(right.width())?;
        // Zeroing idiom (`xor eax, eax`).
        if left == right && !matches!(left, Self::Undef(_)) {
            return Ok(Self::constant(0, left.width()));
        }
        if right.as_const() == Some(0) {
            return Ok(left);
        }
        Self::binary_node(BinaryOp::Xor, left, right)
    }

    pub fn shl(left: Self, amount: Self) -> Result<Self> {
        if amount.as_const() == Some(0) {
            return Ok(left);
        }
        Self::binary_node(BinaryOp::Shl, left, amount)
    }

    pub fn lshr(left: Self, amount: Self) -> Result<Self> {
        if amount.as_const() == Some(0) {
            return Ok(left);
        }
        Self::binary_node(BinaryOp::Lshr, left, amount)
    }

    pub fn ashr(left: Self, amount: Self) -> Result<Self> {
        if amount.as_const() == Some(0) {
            return Ok(left);
        }
        Self::binary_node(BinaryOp::Ashr, left, amount)
    }

    pub fn eq(left: Self, right: Self) -> Result<Self> {
        Self::binary_node(BinaryOp::Eq, left, right)
    }

    pub fn ne(left: Self, right: Self) -> Result<Self> {
        Ok(Self::not(Self::eq(left, right)?))
    }

    pub fn ult(left: Self, right: Self) -> Result<Self> {
        Self::binary_node(BinaryOp::Ult, left, right)
    }

    pub fn slt(left: Self, right: Self) -> Result<Self> {
        Self::binary_node(BinaryOp::Slt, left, right)
    }

    /// Select `then_val` when `cond` (a single bit) is set.
    pub fn ite(cond: Self, then_val: Self, else_val: Self) -> Result<Self> {
        Width::W1.expect(cond.width())?;
        let width = then_val.width();
        width.expect(else_val.width())?;
        match cond.as_const() {
            Some(0) => return Ok(else_val),
            Some(_) => return Ok(then_val),
            None => {}
        }
        if then_val == else_val {
            return Ok(then_val);
        }
        Ok(Self::Ite {
            cond: Box::new(cond),
            then_val: Box::new(then_val),
            else_val: Box::new(else_val),
            width,
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const { value, width } => write!(f, "{value:#x}:{width}"),
            Self::Initial { reg, .. } => write!(f, "init(r{})", reg.0),
            Self::Assigned { id, .. } => write!(f, "{id}"),
            Self::Undef(width) => write!(f, "undef:{width}"),
            Self::Unary { op, arg, width } => write!(f, "{op:?}({arg}):{width}"),
            Self::Binary {
                op, left, right, ..
            } => write!(f, "({left} {op:?} {right})"),
            Self::Ite {
                cond,
                then_val,
                else_val,
                ..
            } => write!(f, "ite({cond}, {then_val}, {else_val})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsp() -> Expr {
        Expr::initial(Reg(4), Width::W64)
    }

    #[test]
    fn test_constant_folding() {
        let e = Expr::add(Expr::constant(2, Width::W8), Expr::constant(0xFF, Width::W8)).unwrap();
        assert_eq!(e.as_const(), Some(1));
    }

    #[test]
    fn test_sub_const_becomes_add() {
        let e = Expr::sub(rsp(), Expr::constant(8, Width::W64)).unwrap();
        let (base, off) = e.split_offset();
        assert_eq!(base, &rsp());
        assert_eq!(off, -8);
    }

    #[test]
    fn test_offset_chain_folds() {
        let e = Expr::sub(rsp(), Expr::constant(8, Width::W64)).unwrap();
        let e = Expr::add(e, Expr::constant(16, Width::W64)).unwrap();
        assert_eq!(e.split_offset(), (&rsp(), 8));
        let back = Expr::add(e, Expr::constant(0u64.wrapping_sub(8), Width::W64)).unwrap();
        assert_eq!(back, rsp());
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let err = Expr::add(rsp(), Expr::constant(1, Width::W32)).unwrap_err();
        assert!(matches!(err, WidthError::Mismatch { .. }));
        assert!(Expr::zext(rsp(), Width::W32).is_err());
        assert!(Expr::trunc(Expr::constant(1, Width::W8), Width::W64).is_err());
    }

    #[test]
    fn test_xor_zero_idiom() {
        let eax = Expr::initial(Reg(0), Width::W32);
        let e = Expr::xor(eax.clone(), eax).unwrap();
        assert_eq!(e.as_const(), Some(0));
    }

    #[test]
    fn test_comparisons_are_single_bit() {
        let e = Expr::eq(rsp(), Expr::constant(0, Width::W64)).unwrap();
        assert_eq!(e.width(), Width::W1);
        assert_eq!(BinaryOp::Slt.apply(0xFF, 0x01, Width::W8), 1);
        assert_eq!(BinaryOp::Ult.apply(0xFF, 0x01, Width::W8), 0);
    }

    #[test]
    fn test_shift_apply() {
        assert_eq!(BinaryOp::Shl.apply(1, 3, Width::W64), 8);
        assert_eq!(BinaryOp::Shl.apply(1, 64, Width::W64), 0);
        assert_eq!(BinaryOp::Ashr.apply(0x80, 7, Width::W8), 0xFF);
    }

    #[test]
    fn test_ite_folds_constant_condition() {
        let e = Expr::ite(Expr::bool(true), rsp(), Expr::constant(0, Width::W64)).unwrap();
        assert_eq!(e, rsp());
    }

    #[test]
    fn test_extend_then_truncate() {
        let al = Expr::initial(Reg(0), Width::W8);
        let wide = Expr::zext(al.clone(), Width::W64).unwrap();
        assert_eq!(Expr::trunc(wide, Width::W8).unwrap(), al);
    }
}
