//! Symbolic IR for control-flow discovery.
//!
//! This crate provides the architecture-independent statement language that
//! instruction semantics lower machine code into. Every value carries a runtime
//! bit-width; combining values of different widths is an error rather than a
//! silent truncation.

mod block;
mod builder;
mod expr;
mod stmt;
mod terminator;
mod width;

pub use block::*;
pub use builder::*;
pub use expr::*;
pub use stmt::*;
pub use terminator::*;
pub use width::*;

use thiserror::Error;

/// Width errors raised when values of incompatible sizes are combined.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WidthError {
    #[error("width mismatch: expected {expected} bits, got {actual} bits")]
    Mismatch { expected: u8, actual: u8 },
    #[error("invalid cast from {from} bits to {to} bits")]
    InvalidCast { from: u8, to: u8 },
    #[error("unsupported bit width: {0}")]
    Unsupported(u8),
    #[error("register {0} out of range")]
    BadRegister(u16),
}

pub type Result<T> = std::result::Result<T, WidthError>;
