//! Call identification.

use disco_arch::Architecture;
use disco_ir::{Expr, Stmt};
use disco_mem::Memory;

use super::{CallTarget, Ctx, ParsedBlock, ParsedTerm};
use crate::error::Result;

/// Find the return-address push of a call.
///
/// Scans backward for the most recent write to the final stack pointer
/// `sp`. That write decides: a code-address constant makes the block a
/// call, anything else does not. An architecture-specific statement seen
/// first rejects the block. On success returns the statements without the
/// push, and the pushed return address.
pub fn strip_call(memory: &Memory, stmts: &[Stmt], sp: &Expr) -> Option<(Vec<Stmt>, u64)> {
    for (idx, stmt) in stmts.iter().enumerate().rev() {
        match stmt {
            Stmt::ArchStmt { .. } => return None,
            Stmt::WriteMem { addr, value } if addr == sp => {
                let return_addr = value
                    .as_const()
                    .filter(|addr| memory.is_code_address(*addr))?;
                let mut rest = stmts.to_vec();
                rest.remove(idx);
                return Some((rest, return_addr));
            }
            _ => {}
        }
    }
    None
}

pub(super) fn call<A: Architecture>(ctx: &Ctx<'_, A>) -> Result<Option<ParsedBlock>> {
    let Some((stmts, return_addr)) = strip_call(&ctx.state.memory, &ctx.block.stmts, ctx.sp)
    else {
        return Ok(None);
    };
    let target = ctx
        .target
        .map_or_else(|| CallTarget::Indirect(ctx.ip.clone()), CallTarget::Direct);
    Ok(Some(ParsedBlock::new(
        ctx.block,
        stmts,
        ParsedTerm::Call {
            target,
            return_addr,
        },
    )))
}
