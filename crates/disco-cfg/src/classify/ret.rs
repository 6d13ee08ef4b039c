//! Return identification.

use disco_arch::Architecture;
use disco_ir::{AssignRhs, Expr, Stmt};

use super::{Ctx, ParsedBlock, ParsedTerm};
use crate::error::Result;

/// Recognize a return and drop the load of the return address.
///
/// `ip` must be the result of a load from `base + off` where the final stack
/// pointer is `base + off + call_stack_delta`: the slot a call would have
/// pushed to, already popped.
pub fn strip_return(
    stmts: &[Stmt],
    ip: &Expr,
    sp: &Expr,
    call_stack_delta: i64,
) -> Option<Vec<Stmt>> {
    let id = ip.as_assigned()?;
    let idx = stmts.iter().position(|stmt| stmt.assign_id() == Some(id))?;
    let Stmt::Assign {
        rhs: AssignRhs::ReadMem { addr, .. },
        ..
    } = &stmts[idx]
    else {
        return None;
    };

    let (ip_base, ip_off) = addr.split_offset();
    let (sp_base, sp_off) = sp.split_offset();
    if ip_base != sp_base || ip_off.wrapping_add(call_stack_delta) != sp_off {
        return None;
    }
    let mut rest = stmts.to_vec();
    rest.remove(idx);
    Some(rest)
}

pub(super) fn ret<A: Architecture>(ctx: &Ctx<'_, A>) -> Result<Option<ParsedBlock>> {
    let delta = ctx.state.arch.call_stack_delta();
    Ok(strip_return(&ctx.block.stmts, ctx.ip, ctx.sp, delta)
        .map(|stmts| ParsedBlock::new(ctx.block, stmts, ParsedTerm::Return)))
}
