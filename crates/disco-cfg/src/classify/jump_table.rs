//! Jump-table identification.

use disco_arch::Architecture;
use disco_ir::{AssignRhs, BinaryOp, Expr, Stmt};
use disco_mem::Memory;

use super::{Ctx, ParsedBlock, ParsedTerm};
use crate::error::Result;
use crate::functions::FunctionEntries;

/// Upper bound on enumerated table entries.
pub const MAX_JUMP_TABLE_ENTRIES: u64 = 4096;

/// Stride of `index * stride` or `index << log2(stride)`.
fn scaled_index(expr: &Expr) -> Option<u64> {
    let Expr::Binary {
        op, left, right, ..
    } = expr
    else {
        return None;
    };
    match op {
        BinaryOp::Mul => right.as_const().or_else(|| left.as_const()),
        BinaryOp::Shl => right
            .as_const()
            .filter(|shift| *shift < 64)
            .map(|shift| 1u64 << shift),
        _ => None,
    }
}

/// Table base of a load from `base + stride * index`.
fn table_base(stmts: &[Stmt], ip: &Expr, ptr_bytes: u64) -> Option<u64> {
    let id = ip.as_assigned()?;
    let (addr, width) = stmts.iter().find_map(|stmt| match stmt {
        Stmt::Assign {
            id: this,
            rhs: AssignRhs::ReadMem { addr, width },
        } if *this == id => Some((addr, *width)),
        _ => None,
    })?;
    if width.bytes() != ptr_bytes {
        return None;
    }
    let (index, base) = addr.split_offset();
    (scaled_index(index)? == ptr_bytes).then_some(base.cast_unsigned())
}

/// Read table entries at `base` until one is not a code pointer of `owner`.
///
/// Entries must lie in read-only memory. The result may undercount a table
/// whose tail points elsewhere; it never includes a bogus target.
pub fn enumerate_table(
    memory: &Memory,
    functions: &FunctionEntries,
    base: u64,
    ptr_bytes: u64,
    owner: Option<u64>,
) -> Vec<u64> {
    let Ok(size) = usize::try_from(ptr_bytes) else {
        return Vec::new();
    };
    let mut targets = Vec::new();
    for index in 0..MAX_JUMP_TABLE_ENTRIES {
        let Some(entry) = index
            .checked_mul(ptr_bytes)
            .and_then(|off| base.checked_add(off))
        else {
            break;
        };
        if !memory.is_read_only(entry) {
            break;
        }
        let Some(target) = memory.read_readonly_word(entry, size) else {
            break;
        };
        if !memory.is_code_address(target) || functions.owner(target) != owner {
            break;
        }
        targets.push(target);
    }
    targets
}

pub(super) fn jump_table<A: Architecture>(ctx: &Ctx<'_, A>) -> Result<Option<ParsedBlock>> {
    let ptr_bytes = ctx.state.arch.ptr_bytes();
    let Some(base) = table_base(&ctx.block.stmts, ctx.ip, ptr_bytes) else {
        return Ok(None);
    };
    let memory = &ctx.state.memory;
    if !memory.is_read_only(base) {
        return Ok(None);
    }
    let targets = enumerate_table(memory, &ctx.state.functions, base, ptr_bytes, ctx.owner);
    if targets.is_empty() {
        return Ok(None);
    }
    let end = base + targets.len() as u64 * ptr_bytes;
    Ok(Some(ParsedBlock::keep(
        ctx.block,
        ParsedTerm::JumpTable { base, end, targets },
    )))
}
