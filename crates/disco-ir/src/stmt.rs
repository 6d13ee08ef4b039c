//! Statement IR.

use std::fmt;

use crate::expr::{AssignId, Expr};
use crate::width::Width;

/// Right-hand side of an assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssignRhs {
    /// Name a pure expression.
    Eval(Expr),
    /// Load `width` bits from memory.
    ReadMem { addr: Expr, width: Width },
}

impl AssignRhs {
    /// Width of the assigned value.
    pub const fn width(&self) -> Width {
        match self {
            Self::Eval(expr) => expr.width(),
            Self::ReadMem { width, .. } => *width,
        }
    }
}

/// Statement kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    /// Marks the start of a machine instruction.
    InstrStart { addr: u64, len: u64 },
    /// Bind a value to an assignment id.
    Assign { id: AssignId, rhs: AssignRhs },
    /// Store `value` at `addr` (little-endian, `value`'s width).
    WriteMem { addr: Expr, value: Expr },
    /// Architecture-specific effect the generic analyses cannot see through.
    ArchStmt { name: String, args: Vec<Expr> },
    Comment(String),
}

impl Stmt {
    /// Create a memory write statement.
    pub const fn write_mem(addr: Expr, value: Expr) -> Self {
        Self::WriteMem { addr, value }
    }

    /// Create an architecture-specific statement.
    pub fn arch(name: &str, args: Vec<Expr>) -> Self {
        Self::ArchStmt {
            name: name.to_string(),
            args,
        }
    }

    /// Assignment id bound by this statement, if any.
    pub const fn assign_id(&self) -> Option<AssignId> {
        match self {
            Self::Assign { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Check if this is an architecture-specific statement.
    pub const fn is_arch(&self) -> bool {
        matches!(self, Self::ArchStmt { .. })
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstrStart { addr, len } => write!(f, "# {addr:#x} ({len} bytes)"),
            Self::Assign {
                id,
                rhs: AssignRhs::Eval(expr),
            } => write!(f, "{id} := {expr}"),
            Self::Assign {
                id,
                rhs: AssignRhs::ReadMem { addr, width },
            } => write!(f, "{id} := *{width}[{addr}]"),
            Self::WriteMem { addr, value } => write!(f, "*[{addr}] := {value}"),
            Self::ArchStmt { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Comment(text) => write!(f, "# {text}"),
        }
    }
}
