//! Lowering of decoded x86-64 instructions into symbolic IR.

use disco_ir::{BlockBuilder, Expr, Width};
use iced_x86::{ConditionCode, Instruction, Mnemonic, OpKind, Register};

use super::{CF, FS_BASE, OF, PF, RAX, RBP, RBX, RCX, RDX, RIP, RSP, R11, SF, ZF};
use crate::{DecodeError, Flow, Result};

fn c64(value: u64) -> Expr {
    Expr::constant(value, Width::W64)
}

const fn is_cmovcc(mnemonic: Mnemonic) -> bool {
    matches!(
        mnemonic,
        Mnemonic::Cmovo
            | Mnemonic::Cmovno
            | Mnemonic::Cmovb
            | Mnemonic::Cmovae
            | Mnemonic::Cmove
            | Mnemonic::Cmovne
            | Mnemonic::Cmovbe
            | Mnemonic::Cmova
            | Mnemonic::Cmovs
            | Mnemonic::Cmovns
            | Mnemonic::Cmovp
            | Mnemonic::Cmovnp
            | Mnemonic::Cmovl
            | Mnemonic::Cmovge
            | Mnemonic::Cmovle
            | Mnemonic::Cmovg
    )
}

const fn is_setcc(mnemonic: Mnemonic) -> bool {
    matches!(
        mnemonic,
        Mnemonic::Seto
            | Mnemonic::Setno
            | Mnemonic::Setb
            | Mnemonic::Setae
            | Mnemonic::Sete
            | Mnemonic::Setne
            | Mnemonic::Setbe
            | Mnemonic::Seta
            | Mnemonic::Sets
            | Mnemonic::Setns
            | Mnemonic::Setp
            | Mnemonic::Setnp
            | Mnemonic::Setl
            | Mnemonic::Setge
            | Mnemonic::Setle
            | Mnemonic::Setg
    )
}

fn width_of(bytes: usize) -> Result<Width> {
    Ok(Width::from_bytes(bytes as u64)?)
}

/// Which part of a general-purpose register an operand names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Part {
    Full,
    Low32,
    Low16,
    Low8,
    High8,
}

fn gpr(reg: Register) -> Option<(disco_ir::Reg, Part)> {
    if !reg.is_gpr() {
        return None;
    }
    let full = reg.full_register();
    let index = u16::try_from(full.number()).ok()?;
    let part = match reg {
        Register::AH | Register::CH | Register::DH | Register::BH => Part::High8,
        _ => match reg.size() {
            8 => Part::Full,
            4 => Part::Low32,
            2 => Part::Low16,
            _ => Part::Low8,
        },
    };
    Some((disco_ir::Reg(index), part))
}

/// Lowers one instruction into a block builder.
pub(super) struct Lowerer<'a> {
    instr: &'a Instruction,
    addr: u64,
    next: u64,
    b: &'a mut BlockBuilder,
}

impl<'a> Lowerer<'a> {
    pub(super) fn new(
        instr: &'a Instruction,
        addr: u64,
        len: u64,
        b: &'a mut BlockBuilder,
    ) -> Self {
        Self {
            instr,
            addr,
            next: addr.wrapping_add(len),
            b,
        }
    }

    fn unsupported(&self) -> DecodeError {
        DecodeError::Unsupported {
            addr: self.addr,
            mnemonic: format!("{:?}", self.instr.mnemonic()).to_lowercase(),
        }
    }

    pub(super) fn lower(mut self) -> Result<Flow> {
        // RIP-relative operands are already resolved by the decoder, so the
        // instruction pointer can hold the fall-through address throughout.
        self.b.set_reg(RIP, c64(self.next))?;

        if self.instr.is_jcc_short_or_near() {
            let cond = self.condition()?;
            return Ok(Flow::Branch {
                cond,
                taken: self.instr.near_branch_target(),
            });
        }
        if is_cmovcc(self.instr.mnemonic()) {
            return self.cmov();
        }
        if is_setcc(self.instr.mnemonic()) {
            let cond = self.condition()?;
            self.write_operand(0, Expr::zext(cond, Width::W8)?)?;
            return Ok(Flow::Next);
        }

        match self.instr.mnemonic() {
            Mnemonic::Nop
            | Mnemonic::Endbr64
            | Mnemonic::Endbr32
            | Mnemonic::Pause
            | Mnemonic::Prefetchnta
            | Mnemonic::Prefetcht0
            | Mnemonic::Prefetcht1
            | Mnemonic::Prefetcht2 => Ok(Flow::Next),
            Mnemonic::Push => {
                if self.operand_width(0).is_some_and(|w| w != Width::W64) {
                    return Err(self.unsupported());
                }
                let value = self.read_operand(0, Width::W64)?;
                self.push(value)?;
                Ok(Flow::Next)
            }
            Mnemonic::Pop => {
                let value = self.pop()?;
                self.write_operand(0, value)?;
                Ok(Flow::Next)
            }
            Mnemonic::Call => {
                let target = self.branch_target()?;
                self.push(c64(self.next))?;
                self.b.set_reg(RIP, target)?;
                Ok(Flow::Jump)
            }
            Mnemonic::Ret => {
                let target = self.pop()?;
                if self.instr.op_count() == 1 {
                    let extra = self.instr.immediate(0);
                    let sp = Expr::add(self.b.reg(RSP)?, c64(extra))?;
                    self.b.set_reg(RSP, sp)?;
                }
                self.b.set_reg(RIP, target)?;
                Ok(Flow::Jump)
            }
            Mnemonic::Jmp => {
                let target = self.branch_target()?;
                self.b.set_reg(RIP, target)?;
                Ok(Flow::Jump)
            }
            Mnemonic::Mov => {
                let width = self.dest_width()?;
                let value = self.read_operand(1, width)?;
                self.write_operand(0, value)?;
                Ok(Flow::Next)
            }
            Mnemonic::Movzx | Mnemonic::Movsx | Mnemonic::Movsxd => {
                let to = self.dest_width()?;
                let from = self.operand_width(1).ok_or_else(|| self.unsupported())?;
                let value = self.read_operand(1, from)?;
                let value = if self.instr.mnemonic() == Mnemonic::Movzx {
                    Expr::zext(value, to)?
                } else {
                    Expr::sext(value, to)?
                };
                self.write_operand(0, value)?;
                Ok(Flow::Next)
            }
            Mnemonic::Lea => {
                let width = self.dest_width()?;
                let addr = Expr::trunc(self.effective_address()?, width)?;
                self.write_operand(0, addr)?;
                Ok(Flow::Next)
            }
            Mnemonic::Add
            | Mnemonic::Adc
            | Mnemonic::Sub
            | Mnemonic::Sbb
            | Mnemonic::Cmp
            | Mnemonic::And
            | Mnemonic::Or
            | Mnemonic::Xor
            | Mnemonic::Test => self.arith(),
            Mnemonic::Inc | Mnemonic::Dec | Mnemonic::Neg | Mnemonic::Not => self.unary(),
            Mnemonic::Shl | Mnemonic::Sal | Mnemonic::Shr | Mnemonic::Sar => self.shift(),
            Mnemonic::Imul | Mnemonic::Mul => self.multiply(),
            Mnemonic::Div | Mnemonic::Idiv => {
                self.b.set_reg(RAX, Expr::undef(Width::W64))?;
                self.b.set_reg(RDX, Expr::undef(Width::W64))?;
                self.clobber_flags()?;
                Ok(Flow::Next)
            }
            Mnemonic::Xchg => {
                let width = self.dest_width()?;
                let a = self.read_operand(0, width)?;
                let b = self.read_operand(1, width)?;
                self.write_operand(0, b)?;
                self.write_operand(1, a)?;
                Ok(Flow::Next)
            }
            Mnemonic::Leave => {
                let frame = self.b.reg(RBP)?;
                self.b.set_reg(RSP, frame)?;
                let saved = self.pop()?;
                self.b.set_reg(RBP, saved)?;
                Ok(Flow::Next)
            }
            Mnemonic::Cdqe => {
                let eax = self.read_reg(Register::EAX)?;
                self.b.set_reg(RAX, Expr::sext(eax, Width::W64)?)?;
                Ok(Flow::Next)
            }
            Mnemonic::Cwde => {
                let ax = self.read_reg(Register::AX)?;
                self.write_reg(Register::EAX, Expr::sext(ax, Width::W32)?)?;
                Ok(Flow::Next)
            }
            Mnemonic::Cdq => {
                let eax = self.read_reg(Register::EAX)?;
                let sign = Expr::ashr(eax, Expr::constant(31, Width::W8))?;
                self.write_reg(Register::EDX, sign)?;
                Ok(Flow::Next)
            }
            Mnemonic::Cqo => {
                let rax = self.b.reg(RAX)?;
                let sign = Expr::ashr(rax, Expr::constant(63, Width::W8))?;
                self.b.set_reg(RDX, sign)?;
                Ok(Flow::Next)
            }
            Mnemonic::Syscall => {
                self.b.set_reg(RCX, c64(self.next))?;
                self.b.set_reg(R11, Expr::undef(Width::W64))?;
                Ok(Flow::Syscall)
            }
            Mnemonic::Cpuid => {
                let leaf = self.read_reg(Register::EAX)?;
                let sub = self.read_reg(Register::ECX)?;
                self.b.arch_stmt("cpuid", vec![leaf, sub]);
                for reg in [RAX, RBX, RCX, RDX] {
                    self.b.set_reg(reg, Expr::undef(Width::W64))?;
                }
                Ok(Flow::Next)
            }
            Mnemonic::Rdtsc => {
                self.b.arch_stmt("rdtsc", Vec::new());
                self.b.set_reg(RAX, Expr::undef(Width::W64))?;
                self.b.set_reg(RDX, Expr::undef(Width::W64))?;
                Ok(Flow::Next)
            }
            _ => Err(self.unsupported()),
        }
    }

    // Registers

    fn read_reg(&self, reg: Register) -> Result<Expr> {
        let (index, part) = gpr(reg).ok_or_else(|| self.unsupported())?;
        let full = self.b.reg(index)?;
        let value = match part {
            Part::Full => full,
            Part::Low32 => Expr::trunc(full, Width::W32)?,
            Part::Low16 => Expr::trunc(full, Width::W16)?,
            Part::Low8 => Expr::trunc(full, Width::W8)?,
            Part::High8 => Expr::trunc(
                Expr::lshr(full, Expr::constant(8, Width::W8))?,
                Width::W8,
            )?,
        };
        Ok(value)
    }

    fn write_reg(&mut self, reg: Register, value: Expr) -> Result<()> {
        let (index, part) = gpr(reg).ok_or_else(|| self.unsupported())?;
        width_of(reg.size())?.expect(value.width())?;
        let full = match part {
            Part::Full => value,
            // 32-bit writes zero the upper half.
            Part::Low32 => Expr::zext(value, Width::W64)?,
            Part::Low16 | Part::Low8 => {
                let kept = Expr::and(self.b.reg(index)?, c64(!value.width().mask()))?;
                Expr::or(kept, Expr::zext(value, Width::W64)?)?
            }
            Part::High8 => {
                let kept = Expr::and(self.b.reg(index)?, c64(!0xFF00))?;
                let moved = Expr::shl(
                    Expr::zext(value, Width::W64)?,
                    Expr::constant(8, Width::W8),
                )?;
                Expr::or(kept, moved)?
            }
        };
        self.b.set_reg(index, full)?;
        Ok(())
    }

    // Operands

    fn effective_address(&self) -> Result<Expr> {
        let mut addr: Option<Expr> = None;
        let mut add = |term: Expr| -> Result<()> {
            addr = Some(match addr.take() {
                Some(acc) => Expr::add(acc, term)?,
                None => term,
            });
            Ok(())
        };

        match self.instr.memory_segment() {
            Register::FS => add(self.b.reg(FS_BASE)?)?,
            Register::GS => return Err(self.unsupported()),
            _ => {}
        }
        let base = self.instr.memory_base();
        if base != Register::None && base != Register::RIP && base != Register::EIP {
            add(Expr::zext(self.read_reg(base)?, Width::W64)?)?;
        }
        let index = self.instr.memory_index();
        if index != Register::None {
            let index = Expr::zext(self.read_reg(index)?, Width::W64)?;
            let scale = u64::from(self.instr.memory_index_scale());
            add(Expr::mul(index, c64(scale))?)?;
        }
        // For RIP-relative operands this is already the absolute address.
        add(c64(self.instr.memory_displacement64()))?;
        Ok(addr.unwrap_or_else(|| c64(0)))
    }

    fn memory_width(&self) -> Result<Width> {
        width_of(self.instr.memory_size().size())
    }

    fn operand_width(&self, op: u32) -> Option<Width> {
        match self.instr.op_kind(op) {
            OpKind::Register => width_of(self.instr.op_register(op).size()).ok(),
            OpKind::Memory => self.memory_width().ok(),
            _ => None,
        }
    }

    fn dest_width(&self) -> Result<Width> {
        self.operand_width(0).ok_or_else(|| self.unsupported())
    }

    /// Read operand `op`; immediates are truncated to `width`.
    fn read_operand(&mut self, op: u32, width: Width) -> Result<Expr> {
        match self.instr.op_kind(op) {
            OpKind::Register => self.read_reg(self.instr.op_register(op)),
            OpKind::Memory => {
                let addr = self.effective_address()?;
                let mem_width = self.memory_width()?;
                Ok(self.b.read_mem(addr, mem_width))
            }
            OpKind::Immediate8
            | OpKind::Immediate16
            | OpKind::Immediate32
            | OpKind::Immediate64
            | OpKind::Immediate8to16
            | OpKind::Immediate8to32
            | OpKind::Immediate8to64
            | OpKind::Immediate32to64 => Ok(Expr::constant(self.instr.immediate(op), width)),
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                Ok(c64(self.instr.near_branch_target()))
            }
            _ => Err(self.unsupported()),
        }
    }

    fn write_operand(&mut self, op: u32, value: Expr) -> Result<()> {
        match self.instr.op_kind(op) {
            OpKind::Register => self.write_reg(self.instr.op_register(op), value),
            OpKind::Memory => {
                self.memory_width()?.expect(value.width())?;
                let addr = self.effective_address()?;
                self.b.write_mem(addr, value);
                Ok(())
            }
            _ => Err(self.unsupported()),
        }
    }

    fn branch_target(&mut self) -> Result<Expr> {
        self.read_operand(0, Width::W64)
    }

    // Stack

    fn push(&mut self, value: Expr) -> Result<()> {
        let sp = Expr::sub(self.b.reg(RSP)?, c64(8))?;
        self.b.write_mem(sp.clone(), value);
        self.b.set_reg(RSP, sp)?;
        Ok(())
    }

    fn pop(&mut self) -> Result<Expr> {
        let sp = self.b.reg(RSP)?;
        let value = self.b.read_mem(sp.clone(), Width::W64);
        self.b.set_reg(RSP, Expr::add(sp, c64(8))?)?;
        Ok(value)
    }

    // Flags

    fn condition(&self) -> Result<Expr> {
        let cf = self.b.reg(CF)?;
        let zf = self.b.reg(ZF)?;
        let sf = self.b.reg(SF)?;
        let of = self.b.reg(OF)?;
        let pf = self.b.reg(PF)?;
        let less = || Expr::xor(sf.clone(), of.clone());
        let cond = match self.instr.condition_code() {
            ConditionCode::o => of.clone(),
            ConditionCode::no => Expr::not(of.clone()),
            ConditionCode::b => cf.clone(),
            ConditionCode::ae => Expr::not(cf.clone()),
            ConditionCode::e => zf.clone(),
            ConditionCode::ne => Expr::not(zf.clone()),
            ConditionCode::be => Expr::or(cf.clone(), zf.clone())?,
            ConditionCode::a => Expr::not(Expr::or(cf.clone(), zf.clone())?),
            ConditionCode::s => sf.clone(),
            ConditionCode::ns => Expr::not(sf.clone()),
            ConditionCode::p => pf,
            ConditionCode::np => Expr::not(pf),
            ConditionCode::l => less()?,
            ConditionCode::ge => Expr::not(less()?),
            ConditionCode::le => Expr::or(zf.clone(), less()?)?,
            ConditionCode::g => Expr::not(Expr::or(zf.clone(), less()?)?),
            ConditionCode::None => return Err(self.unsupported()),
        };
        Ok(cond)
    }

    fn set_flags(&mut self, cf: Expr, zf: Expr, sf: Expr, of: Expr) -> Result<()> {
        self.b.set_reg(CF, cf)?;
        self.b.set_reg(ZF, zf)?;
        self.b.set_reg(SF, sf)?;
        self.b.set_reg(OF, of)?;
        self.b.set_reg(PF, Expr::undef(Width::W1))?;
        Ok(())
    }

    fn clobber_flags(&mut self) -> Result<()> {
        let undef = Expr::undef(Width::W1);
        self.set_flags(undef.clone(), undef.clone(), undef.clone(), undef)
    }

    fn is_zero(value: &Expr) -> Result<Expr> {
        Ok(Expr::eq(value.clone(), Expr::constant(0, value.width()))?)
    }

    fn is_negative(value: &Expr) -> Result<Expr> {
        Ok(Expr::slt(value.clone(), Expr::constant(0, value.width()))?)
    }

    fn sign_min(width: Width) -> Expr {
        Expr::constant(1u64 << (width.bits() - 1), width)
    }

    // Instruction groups

    fn arith(&mut self) -> Result<Flow> {
        let width = self.dest_width()?;
        let a = self.read_operand(0, width)?;
        let b = self.read_operand(1, width)?;
        let mnemonic = self.instr.mnemonic();
        let result = match mnemonic {
            Mnemonic::Add => {
                let res = Expr::add(a.clone(), b.clone())?;
                let overflow = Expr::and(
                    Expr::xor(a.clone(), res.clone())?,
                    Expr::xor(b, res.clone())?,
                )?;
                self.set_flags(
                    Expr::ult(res.clone(), a)?,
                    Self::is_zero(&res)?,
                    Self::is_negative(&res)?,
                    Self::is_negative(&overflow)?,
                )?;
                res
            }
            Mnemonic::Sub | Mnemonic::Cmp => {
                let res = Expr::sub(a.clone(), b.clone())?;
                let sf = Self::is_negative(&res)?;
                let of = Expr::xor(Expr::slt(a.clone(), b.clone())?, sf.clone())?;
                self.set_flags(Expr::ult(a.clone(), b.clone())?, Expr::eq(a, b)?, sf, of)?;
                res
            }
            Mnemonic::Adc | Mnemonic::Sbb => {
                let carry = Expr::zext(self.b.reg(CF)?, width)?;
                let res = if mnemonic == Mnemonic::Adc {
                    Expr::add(Expr::add(a, b)?, carry)?
                } else {
                    Expr::sub(Expr::sub(a, b)?, carry)?
                };
                let undef = Expr::undef(Width::W1);
                self.set_flags(
                    undef.clone(),
                    Self::is_zero(&res)?,
                    Self::is_negative(&res)?,
                    undef,
                )?;
                res
            }
            _ => {
                let res = match mnemonic {
                    Mnemonic::Or => Expr::or(a, b)?,
                    Mnemonic::Xor => Expr::xor(a, b)?,
                    _ => Expr::and(a, b)?,
                };
                self.set_flags(
                    Expr::bool(false),
                    Self::is_zero(&res)?,
                    Self::is_negative(&res)?,
                    Expr::bool(false),
                )?;
                res
            }
        };
        if !matches!(mnemonic, Mnemonic::Cmp | Mnemonic::Test) {
            self.write_operand(0, result)?;
        }
        Ok(Flow::Next)
    }

    fn unary(&mut self) -> Result<Flow> {
        let width = self.dest_width()?;
        let a = self.read_operand(0, width)?;
        let one = Expr::constant(1, width);
        let result = match self.instr.mnemonic() {
            Mnemonic::Not => Expr::not(a),
            Mnemonic::Neg => {
                let res = Expr::neg(a.clone());
                self.set_flags(
                    Expr::ne(a.clone(), Expr::constant(0, width))?,
                    Self::is_zero(&res)?,
                    Self::is_negative(&res)?,
                    Expr::eq(a, Self::sign_min(width))?,
                )?;
                res
            }
            mnemonic => {
                // inc/dec leave CF untouched.
                let cf = self.b.reg(CF)?;
                let (res, of) = if mnemonic == Mnemonic::Inc {
                    let res = Expr::add(a, one)?;
                    let of = Expr::eq(res.clone(), Self::sign_min(width))?;
                    (res, of)
                } else {
                    let of = Expr::eq(a.clone(), Self::sign_min(width))?;
                    (Expr::sub(a, one)?, of)
                };
                self.set_flags(cf, Self::is_zero(&res)?, Self::is_negative(&res)?, of)?;
                res
            }
        };
        self.write_operand(0, result)?;
        Ok(Flow::Next)
    }

    fn shift(&mut self) -> Result<Flow> {
        let width = self.dest_width()?;
        let a = self.read_operand(0, width)?;
        let count = self.read_operand(1, Width::W8)?;
        let mask = if width == Width::W64 { 63 } else { 31 };
        let count = Expr::and(count, Expr::constant(mask, Width::W8))?;
        if count.as_const() == Some(0) {
            return Ok(Flow::Next);
        }
        let res = match self.instr.mnemonic() {
            Mnemonic::Shr => Expr::lshr(a, count)?,
            Mnemonic::Sar => Expr::ashr(a, count)?,
            _ => Expr::shl(a, count)?,
        };
        let undef = Expr::undef(Width::W1);
        self.set_flags(
            undef.clone(),
            Self::is_zero(&res)?,
            Self::is_negative(&res)?,
            undef,
        )?;
        self.write_operand(0, res)?;
        Ok(Flow::Next)
    }

    fn multiply(&mut self) -> Result<Flow> {
        let width = self.dest_width()?;
        match self.instr.op_count() {
            1 => {
                // rdx:rax = rax * src; only the low half is tracked.
                if width != Width::W64 {
                    return Err(self.unsupported());
                }
                let src = self.read_operand(0, width)?;
                let low = Expr::mul(self.b.reg(RAX)?, src)?;
                self.b.set_reg(RAX, low)?;
                self.b.set_reg(RDX, Expr::undef(Width::W64))?;
            }
            2 => {
                let a = self.read_operand(0, width)?;
                let b = self.read_operand(1, width)?;
                self.write_operand(0, Expr::mul(a, b)?)?;
            }
            _ => {
                let a = self.read_operand(1, width)?;
                let b = self.read_operand(2, width)?;
                self.write_operand(0, Expr::mul(a, b)?)?;
            }
        }
        self.clobber_flags()?;
        Ok(Flow::Next)
    }

    fn cmov(&mut self) -> Result<Flow> {
        let width = self.dest_width()?;
        let cond = self.condition()?;
        let src = self.read_operand(1, width)?;
        let dst = self.read_operand(0, width)?;
        self.write_operand(0, Expr::ite(cond, src, dst)?)?;
        Ok(Flow::Next)
    }
}

#[cfg(test)]
mod tests {
    use disco_ir::{AssignRhs, Reg, RegState, Stmt};

    use super::super::{RDI, REG_WIDTHS};
    use super::*;
    use crate::{Architecture, X86_64};

    const BASE: u64 = 0x40_1000;

    fn rsp0() -> Expr {
        Expr::initial(RSP, Width::W64)
    }

    /// Decode and lower `code` instruction by instruction.
    fn run(code: &[u8]) -> Result<(BlockBuilder, Vec<Flow>)> {
        let arch = X86_64::new();
        let mut b = BlockBuilder::new(RegState::initial(&REG_WIDTHS), 0);
        let mut flows = Vec::new();
        let mut offset = 0usize;
        while offset < code.len() {
            let addr = BASE + offset as u64;
            let (instr, len) = arch.decode(&code[offset..], addr)?;
            b.instr_start(addr, len);
            flows.push(arch.execute(&instr, addr, len, &mut b)?);
            offset += len as usize;
        }
        Ok((b, flows))
    }

    #[test]
    fn test_push_writes_below_stack_pointer() {
        // push rbp; mov rbp, rsp
        let (b, _) = run(&[0x55, 0x48, 0x89, 0xE5]).unwrap();
        let slot = Expr::add(rsp0(), c64(0u64.wrapping_sub(8))).unwrap();
        assert_eq!(b.reg(RSP).unwrap(), slot);
        assert_eq!(b.reg(RBP).unwrap(), slot);
        assert!(b.stmts().contains(&Stmt::write_mem(
            slot,
            Expr::initial(RBP, Width::W64)
        )));
    }

    #[test]
    fn test_call_pushes_return_address() {
        // call +0x10
        let (b, flows) = run(&[0xE8, 0x10, 0, 0, 0]).unwrap();
        assert_eq!(flows, vec![Flow::Jump]);
        assert_eq!(b.reg(RIP).unwrap().as_const(), Some(BASE + 0x15));
        let writes: Vec<_> = b
            .stmts()
            .iter()
            .filter_map(|s| match s {
                Stmt::WriteMem { value, .. } => value.as_const(),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec![BASE + 5]);
    }

    #[test]
    fn test_ret_loads_instruction_pointer() {
        let (b, flows) = run(&[0xC3]).unwrap();
        assert_eq!(flows, vec![Flow::Jump]);
        let id = b.reg(RIP).unwrap().as_assigned().unwrap();
        let load = b.stmts().iter().find(|s| s.assign_id() == Some(id)).unwrap();
        assert!(matches!(
            load,
            Stmt::Assign { rhs: AssignRhs::ReadMem { addr, .. }, .. } if *addr == rsp0()
        ));
        assert_eq!(b.reg(RSP).unwrap().split_offset(), (&rsp0(), 8));
    }

    #[test]
    fn test_exit_syscall_sequence() {
        // mov eax, 60; xor edi, edi; syscall
        let (b, flows) = run(&[0xB8, 0x3C, 0, 0, 0, 0x31, 0xFF, 0x0F, 0x05]).unwrap();
        assert_eq!(flows.last(), Some(&Flow::Syscall));
        assert_eq!(b.reg(RAX).unwrap().as_const(), Some(60));
        assert_eq!(b.reg(RDI).unwrap().as_const(), Some(0));
        assert_eq!(b.reg(RIP).unwrap().as_const(), Some(BASE + 9));
    }

    #[test]
    fn test_compare_and_branch() {
        // cmp rdi, 3; ja +0x20
        let (_, flows) = run(&[0x48, 0x83, 0xFF, 0x03, 0x77, 0x20]).unwrap();
        match &flows[1] {
            Flow::Branch { cond, taken } => {
                assert_eq!(*taken, BASE + 6 + 0x20);
                assert_eq!(cond.width(), Width::W1);
            }
            other => panic!("expected branch, got {other:?}"),
        }
    }

    #[test]
    fn test_constant_branch_folds() {
        // xor eax, eax; je +0
        let (_, flows) = run(&[0x31, 0xC0, 0x74, 0x00]).unwrap();
        assert!(matches!(&flows[1], Flow::Branch { cond, .. } if cond.as_const() == Some(1)));
    }

    #[test]
    fn test_cmov_lowers_to_ite() {
        // cmove rax, rcx
        let (b, flows) = run(&[0x48, 0x0F, 0x44, 0xC1]).unwrap();
        assert_eq!(flows, vec![Flow::Next]);
        let expected = Expr::ite(
            Expr::initial(ZF, Width::W1),
            Expr::initial(RCX, Width::W64),
            Expr::initial(RAX, Width::W64),
        )
        .unwrap();
        assert_eq!(b.reg(RAX).unwrap(), expected);

        // xor eax, eax; cmove rax, rcx: the move always happens.
        let (b, _) = run(&[0x31, 0xC0, 0x48, 0x0F, 0x44, 0xC1]).unwrap();
        assert_eq!(b.reg(RAX).unwrap(), Expr::initial(RCX, Width::W64));
    }

    #[test]
    fn test_setcc_writes_byte() {
        // sete al
        let (b, flows) = run(&[0x0F, 0x94, 0xC0]).unwrap();
        assert_eq!(flows, vec![Flow::Next]);
        let byte = Expr::zext(Expr::initial(ZF, Width::W1), Width::W8).unwrap();
        let expected = Expr::or(
            Expr::and(Expr::initial(RAX, Width::W64), c64(!0xFF)).unwrap(),
            Expr::zext(byte, Width::W64).unwrap(),
        )
        .unwrap();
        assert_eq!(b.reg(RAX).unwrap(), expected);

        // xor eax, eax; sete al
        let (b, _) = run(&[0x31, 0xC0, 0x0F, 0x94, 0xC0]).unwrap();
        assert_eq!(b.reg(RAX).unwrap().as_const(), Some(1));
    }

    #[test]
    fn test_jump_table_address_shape() {
        // jmp [rax*8 + 0x402000]
        let (b, flows) = run(&[0xFF, 0x24, 0xC5, 0x00, 0x20, 0x40, 0x00]).unwrap();
        assert_eq!(flows, vec![Flow::Jump]);
        let id = b.reg(RIP).unwrap().as_assigned().unwrap();
        let Some(Stmt::Assign {
            rhs: AssignRhs::ReadMem { addr, .. },
            ..
        }) = b.stmts().iter().find(|s| s.assign_id() == Some(id))
        else {
            panic!("missing load");
        };
        let (base, off) = addr.split_offset();
        assert_eq!(off, 0x40_2000);
        assert_eq!(
            *base,
            Expr::mul(Expr::initial(RAX, Width::W64), c64(8)).unwrap()
        );
    }

    #[test]
    fn test_partial_register_writes() {
        // mov al, 0x12; mov ah, 0x34
        let (b, _) = run(&[0xB0, 0x12, 0xB4, 0x34]).unwrap();
        let ax = Expr::trunc(b.reg(RAX).unwrap(), Width::W16).unwrap();
        assert_eq!(ax.width(), Width::W16);
        // mov eax, 0xffffffff zero-extends.
        let (b, _) = run(&[0xB8, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap();
        assert_eq!(b.reg(RAX).unwrap().as_const(), Some(0xFFFF_FFFF));
    }

    #[test]
    fn test_leave_restores_frame() {
        // leave
        let (b, _) = run(&[0xC9]).unwrap();
        let rbp0 = Expr::initial(RBP, Width::W64);
        assert_eq!(b.reg(RSP).unwrap().split_offset(), (&rbp0, 8));
        assert!(b.reg(RBP).unwrap().as_assigned().is_some());
    }

    #[test]
    fn test_cpuid_emits_arch_stmt() {
        let (b, _) = run(&[0x0F, 0xA2]).unwrap();
        assert!(b.stmts().iter().any(Stmt::is_arch));
        assert_eq!(b.reg(RBX).unwrap(), Expr::undef(Width::W64));
    }

    #[test]
    fn test_hlt_is_unsupported() {
        let err = run(&[0xF4]).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported { addr: BASE, .. }));
    }

    #[test]
    fn test_unused_registers_untouched() {
        let (b, _) = run(&[0x90]).unwrap();
        assert_eq!(b.reg(Reg(12)).unwrap(), Expr::initial(Reg(12), Width::W64));
    }
}
