//! Architecture descriptions for control-flow discovery.
//!
//! An [`Architecture`] bundles three things the discovery engine needs and
//! does not implement itself: a register/ABI descriptor, an instruction
//! decoder, and instruction semantics that lower one decoded instruction into
//! the symbolic IR of `disco-ir`. One architecture drives one discovery run.

pub mod syscalls;
pub mod x86_64;

use std::fmt;

use disco_ir::{BlockBuilder, Expr, Reg, Width, WidthError};
use thiserror::Error;

pub use x86_64::X86_64;

/// Decoder and semantics errors.
///
/// None of these abort discovery; they end or skip the block being
/// disassembled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid instruction at {0:#x}")]
    Invalid(u64),
    #[error("truncated instruction at {0:#x}")]
    Truncated(u64),
    #[error("unsupported instruction at {addr:#x}: {mnemonic}")]
    Unsupported { addr: u64, mnemonic: String },
    #[error(transparent)]
    Width(#[from] WidthError),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// How control leaves an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Fall through; the instruction pointer holds the next address.
    Next,
    /// Unconditional transfer; the instruction pointer holds the target.
    Jump,
    /// Conditional branch to `taken`, otherwise to the next address.
    Branch { cond: Expr, taken: u64 },
    /// System call; the instruction pointer holds the next address.
    Syscall,
}

impl Flow {
    /// Check if the instruction ends a block.
    pub const fn ends_block(&self) -> bool {
        !matches!(self, Self::Next)
    }
}

/// Instruction set description used by the discovery engine.
pub trait Architecture: Send + Sync {
    /// Decoded instruction.
    type Instr: Clone + fmt::Debug;

    fn name(&self) -> &'static str;

    /// Width of addresses and pointers.
    fn addr_width(&self) -> Width;

    /// Pointer size in bytes (jump-table stride).
    fn ptr_bytes(&self) -> u64 {
        self.addr_width().bytes()
    }

    /// Width of every register, indexed by `Reg`.
    fn reg_widths(&self) -> &[Width];

    fn reg_name(&self, reg: Reg) -> &'static str;

    fn ip_reg(&self) -> Reg;

    fn sp_reg(&self) -> Reg;

    /// Bytes between a call's return-address slot and the callee's view
    /// of the stack pointer once the callee returns.
    fn call_stack_delta(&self) -> i64;

    /// Register holding the syscall number.
    fn syscall_num_reg(&self) -> Reg;

    /// Registers carrying syscall arguments, in order.
    fn syscall_arg_regs(&self) -> &[Reg];

    /// Registers carrying syscall results, in order.
    fn syscall_result_regs(&self) -> &[Reg];

    /// Registers preserved across calls.
    fn callee_saved_regs(&self) -> &[Reg];

    /// Longest possible instruction encoding in bytes.
    fn max_instr_len(&self) -> usize;

    /// Decode one instruction; returns it together with its length.
    fn decode(&self, bytes: &[u8], addr: u64) -> Result<(Self::Instr, u64)>;

    /// Lower `instr` (at `addr`, `len` bytes long) into `builder`.
    ///
    /// On success the instruction pointer register holds the successor
    /// described by the returned [`Flow`]. On error the builder may hold a
    /// partial lowering; callers roll it back.
    fn execute(
        &self,
        instr: &Self::Instr,
        addr: u64,
        len: u64,
        builder: &mut BlockBuilder,
    ) -> Result<Flow>;
}
