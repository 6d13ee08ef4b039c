//! x86-64 architecture: register file, decoder and semantics.
//!
//! Decoding is done by `iced-x86`. Semantics cover the integer subset found
//! in compiler-generated code; anything else is reported as
//! [`DecodeError::Unsupported`] and ends the block like a decode failure.

mod semantics;

use disco_ir::{BlockBuilder, Reg, Width};
use iced_x86::{Decoder, DecoderError, DecoderOptions, Instruction};

use crate::{Architecture, DecodeError, Flow, Result};

pub const RAX: Reg = Reg(0);
pub const RCX: Reg = Reg(1);
pub const RDX: Reg = Reg(2);
pub const RBX: Reg = Reg(3);
pub const RSP: Reg = Reg(4);
pub const RBP: Reg = Reg(5);
pub const RSI: Reg = Reg(6);
pub const RDI: Reg = Reg(7);
pub const R8: Reg = Reg(8);
pub const R9: Reg = Reg(9);
pub const R10: Reg = Reg(10);
pub const R11: Reg = Reg(11);
pub const R12: Reg = Reg(12);
pub const R13: Reg = Reg(13);
pub const R14: Reg = Reg(14);
pub const R15: Reg = Reg(15);
pub const RIP: Reg = Reg(16);
pub const CF: Reg = Reg(17);
pub const PF: Reg = Reg(18);
pub const ZF: Reg = Reg(19);
pub const SF: Reg = Reg(20);
pub const OF: Reg = Reg(21);
pub const FS_BASE: Reg = Reg(22);

/// Number of modelled registers.
pub const NUM_REGS: usize = 23;

const REG_NAMES: [&str; NUM_REGS] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15", "rip", "cf", "pf", "zf", "sf", "of", "fs_base",
];

const REG_WIDTHS: [Width; NUM_REGS] = [
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W64,
    Width::W1,
    Width::W1,
    Width::W1,
    Width::W1,
    Width::W1,
    Width::W64,
];

const SYSCALL_ARGS: [Reg; 6] = [RDI, RSI, RDX, R10, R8, R9];
const SYSCALL_RESULTS: [Reg; 2] = [RAX, RDX];
const CALLEE_SAVED: [Reg; 7] = [RBX, RSP, RBP, R12, R13, R14, R15];

/// Maximum x86 instruction length.
const MAX_INSTR_LEN: usize = 15;

/// x86-64 in 64-bit mode with the System V / Linux ABI.
#[derive(Clone, Copy, Debug, Default)]
pub struct X86_64;

impl X86_64 {
    pub const fn new() -> Self {
        Self
    }
}

impl Architecture for X86_64 {
    type Instr = Instruction;

    fn name(&self) -> &'static str {
        "x86_64"
    }

    fn addr_width(&self) -> Width {
        Width::W64
    }

    fn reg_widths(&self) -> &[Width] {
        &REG_WIDTHS
    }

    fn reg_name(&self, reg: Reg) -> &'static str {
        REG_NAMES.get(reg.index()).copied().unwrap_or("?")
    }

    fn ip_reg(&self) -> Reg {
        RIP
    }

    fn sp_reg(&self) -> Reg {
        RSP
    }

    fn call_stack_delta(&self) -> i64 {
        8
    }

    fn syscall_num_reg(&self) -> Reg {
        RAX
    }

    fn syscall_arg_regs(&self) -> &[Reg] {
        &SYSCALL_ARGS
    }

    fn syscall_result_regs(&self) -> &[Reg] {
        &SYSCALL_RESULTS
    }

    fn callee_saved_regs(&self) -> &[Reg] {
        &CALLEE_SAVED
    }

    fn max_instr_len(&self) -> usize {
        MAX_INSTR_LEN
    }

    fn decode(&self, bytes: &[u8], addr: u64) -> Result<(Instruction, u64)> {
        let mut decoder = Decoder::new(64, bytes, DecoderOptions::NONE);
        decoder.set_ip(addr);
        let instr = decoder.decode();
        if instr.is_invalid() {
            return Err(match decoder.last_error() {
                DecoderError::NoMoreBytes => DecodeError::Truncated(addr),
                _ => DecodeError::Invalid(addr),
            });
        }
        Ok((instr, instr.len() as u64))
    }

    fn execute(
        &self,
        instr: &Instruction,
        addr: u64,
        len: u64,
        builder: &mut BlockBuilder,
    ) -> Result<Flow> {
        semantics::Lowerer::new(instr, addr, len, builder).lower()
    }
}
