//! Abstract values tracked across block boundaries.

use std::fmt;

use disco_ir::{BinaryOp, UnaryOp, Width};

/// Maximum number of members in a value set before it becomes `Top`.
pub const MAX_VALUES: usize = 32;

/// Abstract value of one register or stack slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AbsValue {
    /// Nothing is known.
    #[default]
    Top,
    /// One of these constants (sorted, deduplicated, non-empty).
    FinSet(Vec<u64>),
    /// One of these addresses, each verified to be executable.
    CodePointers(Vec<u64>),
    /// The stack pointer at entry to function `base`, plus one of `offsets`.
    StackOffset { base: u64, offsets: Vec<i64> },
    /// The return address pushed by the caller.
    ReturnAddr,
}

/// Sort and deduplicate; `None` if the set is empty or too large.
fn bounded<T: Ord>(mut values: Vec<T>) -> Option<Vec<T>> {
    values.sort_unstable();
    values.dedup();
    (!values.is_empty() && values.len() <= MAX_VALUES).then_some(values)
}

fn product<T, U>(left: &[T], right: &[U]) -> bool {
    left.len().saturating_mul(right.len()) <= MAX_VALUES * MAX_VALUES
}

impl AbsValue {
    /// Single constant.
    pub fn constant(value: u64) -> Self {
        Self::FinSet(vec![value])
    }

    /// Set of constants; too many values give `Top`.
    pub fn from_values(values: Vec<u64>) -> Self {
        bounded(values).map_or(Self::Top, Self::FinSet)
    }

    /// Set of verified code addresses.
    pub fn code_pointers(values: Vec<u64>) -> Self {
        bounded(values).map_or(Self::Top, Self::CodePointers)
    }

    /// Stack pointer of function `base` displaced by `offset`.
    pub fn stack(base: u64, offset: i64) -> Self {
        Self::StackOffset {
            base,
            offsets: vec![offset],
        }
    }

    fn stack_set(base: u64, offsets: Vec<i64>) -> Self {
        bounded(offsets).map_or(Self::Top, |offsets| Self::StackOffset { base, offsets })
    }

    pub const fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }

    /// Concrete members, for constant and code-pointer sets.
    pub fn values(&self) -> Option<&[u64]> {
        match self {
            Self::FinSet(values) | Self::CodePointers(values) => Some(values),
            _ => None,
        }
    }

    /// The value, if it is exactly one concrete constant.
    pub fn as_single(&self) -> Option<u64> {
        match self.values() {
            Some([value]) => Some(*value),
            _ => None,
        }
    }

    /// Frame base and offset, if this is exactly one stack address.
    pub fn as_stack(&self) -> Option<(u64, i64)> {
        match self {
            Self::StackOffset { base, offsets } if offsets.len() == 1 => Some((*base, offsets[0])),
            _ => None,
        }
    }

    /// Least upper bound.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (Self::CodePointers(a), Self::CodePointers(b)) => {
                Self::code_pointers(a.iter().chain(b).copied().collect())
            }
            (
                Self::FinSet(a) | Self::CodePointers(a),
                Self::FinSet(b) | Self::CodePointers(b),
            ) => Self::from_values(a.iter().chain(b).copied().collect()),
            (
                Self::StackOffset { base, offsets: a },
                Self::StackOffset {
                    base: other_base,
                    offsets: b,
                },
            ) if base == other_base => Self::stack_set(*base, a.iter().chain(b).copied().collect()),
            _ => Self::Top,
        }
    }

    /// Join that jumps to `Top` as soon as the value would grow.
    #[must_use]
    pub fn widen(&self, other: &Self) -> Self {
        let joined = self.join(other);
        if joined == *self { joined } else { Self::Top }
    }

    /// Apply a unary operation; `from` is the operand width.
    #[must_use]
    pub fn apply_unary(&self, op: UnaryOp, from: Width, to: Width) -> Self {
        if from == to && matches!(op, UnaryOp::Trunc | UnaryOp::ZExt | UnaryOp::SExt) {
            return self.clone();
        }
        match self.values() {
            Some(values) => {
                Self::from_values(values.iter().map(|v| op.apply(*v, from, to)).collect())
            }
            None => Self::Top,
        }
    }

    /// Apply a binary operation on operands of `width`.
    #[must_use]
    pub fn apply_binary(op: BinaryOp, left: &Self, right: &Self, width: Width) -> Self {
        match (op, left, right) {
            (BinaryOp::Add, Self::StackOffset { base, offsets }, other)
            | (BinaryOp::Add, other, Self::StackOffset { base, offsets }) => {
                match other.values() {
                    Some(deltas) if product(offsets, deltas) => Self::stack_set(
                        *base,
                        offsets
                            .iter()
                            .flat_map(|o| {
                                deltas
                                    .iter()
                                    .map(move |d| o.wrapping_add(width.sign_extend(*d)))
                            })
                            .collect(),
                    ),
                    _ => Self::Top,
                }
            }
            (BinaryOp::Sub, Self::StackOffset { base, offsets }, other)
                if other.values().is_some() =>
            {
                let deltas = other.values().unwrap_or_default();
                if !product(offsets, deltas) {
                    return Self::Top;
                }
                Self::stack_set(
                    *base,
                    offsets
                        .iter()
                        .flat_map(|o| {
                            deltas
                                .iter()
                                .map(move |d| o.wrapping_sub(width.sign_extend(*d)))
                        })
                        .collect(),
                )
            }
            (
                BinaryOp::Sub,
                Self::StackOffset { base, offsets: a },
                Self::StackOffset {
                    base: other_base,
                    offsets: b,
                },
            ) if base == other_base && product(a, b) => Self::from_values(
                a.iter()
                    .flat_map(|x| {
                        b.iter()
                            .map(move |y| width.truncate(x.wrapping_sub(*y).cast_unsigned()))
                    })
                    .collect(),
            ),
            _ => match (left.values(), right.values()) {
                (Some(a), Some(b)) if product(a, b) => Self::from_values(
                    a.iter()
                        .flat_map(|x| b.iter().map(move |y| op.apply(*x, *y, width)))
                        .collect(),
                ),
                _ => Self::Top,
            },
        }
    }
}

impl fmt::Display for AbsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => write!(f, "top"),
            Self::FinSet(values) | Self::CodePointers(values) => {
                let tag = if matches!(self, Self::CodePointers(_)) { "code" } else { "" };
                write!(f, "{tag}{{")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:#x}")?;
                }
                write!(f, "}}")
            }
            Self::StackOffset { base, offsets } => write!(f, "stack_{base:x}{offsets:?}"),
            Self::ReturnAddr => write!(f, "return_addr"),
        }
    }
}
