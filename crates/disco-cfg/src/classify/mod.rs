//! Terminator classification.
//!
//! A raw block ends in "fetch and execute whatever IP holds". Classification
//! recovers what that transfer means by trying an ordered list of rules; the
//! first rule that matches decides and no later rule is consulted. Syscall
//! terminators bypass the list.

mod call;
mod jump_table;
mod ret;
mod syscall;

use std::fmt;

use disco_arch::Architecture;
use disco_ir::{Block, BlockLabel, Expr, Reg, Stmt, TermStmt};
use tracing::trace;

use crate::error::{DiscoveryError, Result};
use crate::state::DiscoveryState;
use crate::transfer::BlockTransfer;

pub use call::strip_call;
pub use jump_table::MAX_JUMP_TABLE_ENTRIES;
pub use ret::strip_return;
pub use syscall::classify_syscall;

/// Call destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallTarget {
    /// Statically known entry.
    Direct(u64),
    /// Unresolved pointer value.
    Indirect(Expr),
}

/// Meaning of a block's final control transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedTerm {
    Branch {
        cond: Expr,
        taken: u64,
        fallthrough: u64,
    },
    Call {
        target: CallTarget,
        return_addr: u64,
    },
    /// Direct jump inside the current function.
    Jump { target: u64 },
    Return,
    /// Direct jump into another function.
    TailCall { target: u64 },
    /// Multi-way branch through a table of code pointers.
    JumpTable {
        base: u64,
        end: u64,
        targets: Vec<u64>,
    },
    /// Transfer through an unresolved pointer. Lowest confidence.
    IndirectTailCall { target: Expr },
    Syscall {
        name: String,
        num: Option<u64>,
        args: Vec<Reg>,
        results: Vec<Reg>,
        next: u64,
    },
}

impl ParsedTerm {
    /// Short name of the classification.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Branch { .. } => "branch",
            Self::Call { .. } => "call",
            Self::Jump { .. } => "jump",
            Self::Return => "return",
            Self::TailCall { .. } => "tail call",
            Self::JumpTable { .. } => "jump table",
            Self::IndirectTailCall { .. } => "indirect tail call",
            Self::Syscall { .. } => "syscall",
        }
    }
}

impl fmt::Display for ParsedTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch {
                cond,
                taken,
                fallthrough,
            } => write!(f, "branch {cond} ? {taken:#x} : {fallthrough:#x}"),
            Self::Call {
                target: CallTarget::Direct(target),
                return_addr,
            } => write!(f, "call {target:#x} returning to {return_addr:#x}"),
            Self::Call {
                target: CallTarget::Indirect(target),
                return_addr,
            } => write!(f, "call *{target} returning to {return_addr:#x}"),
            Self::Jump { target } => write!(f, "jump {target:#x}"),
            Self::Return => write!(f, "return"),
            Self::TailCall { target } => write!(f, "tail call {target:#x}"),
            Self::JumpTable { base, targets, .. } => {
                write!(f, "jump table at {base:#x} ({} entries)", targets.len())
            }
            Self::IndirectTailCall { target } => write!(f, "tail call *{target}"),
            Self::Syscall { name, next, .. } => write!(f, "syscall {name}, next {next:#x}"),
        }
    }
}

/// A block with its terminator classified.
///
/// Statements consumed by the classification (the pushed return address of
/// a call, the popped one of a return) are removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedBlock {
    pub label: BlockLabel,
    pub addr: u64,
    pub size: u64,
    pub stmts: Vec<Stmt>,
    pub term: ParsedTerm,
}

impl ParsedBlock {
    fn new(block: &Block, stmts: Vec<Stmt>, term: ParsedTerm) -> Self {
        Self {
            label: block.label,
            addr: block.addr,
            size: block.size,
            stmts,
            term,
        }
    }

    fn keep(block: &Block, term: ParsedTerm) -> Self {
        Self::new(block, block.stmts.clone(), term)
    }
}

/// Inputs shared by the classification rules.
pub(crate) struct Ctx<'s, A: Architecture> {
    state: &'s DiscoveryState<A>,
    block: &'s Block,
    ip: &'s Expr,
    sp: &'s Expr,
    /// Single concrete value of the final instruction pointer, if any.
    target: Option<u64>,
    /// Function owning the block.
    owner: Option<u64>,
}

type Rule<A> = for<'s> fn(&Ctx<'s, A>) -> Result<Option<ParsedBlock>>;

/// Classify the terminator of `block`.
pub fn classify_block<A: Architecture>(
    state: &DiscoveryState<A>,
    block: &Block,
) -> Result<ParsedBlock> {
    if let TermStmt::Syscall(regs) = &block.term {
        return classify_syscall(state, block, regs);
    }

    let regs = block.term.regs();
    let ip = regs.get(state.arch.ip_reg())?;
    let sp = regs.get(state.arch.sp_reg())?;
    let target = ip.as_const().or_else(|| {
        state.abs_states.get(&block.addr).and_then(|entry| {
            BlockTransfer::run(&state.memory, state.arch.addr_width(), entry, block)
                .eval(ip)
                .as_single()
        })
    });
    let ctx = Ctx {
        state,
        block,
        ip,
        sp,
        target,
        owner: state.functions.owner(block.addr),
    };

    // Order matters: the first match wins.
    let rules: [(&str, Rule<A>); 7] = [
        ("branch", branch),
        ("call", call::call),
        ("jump", jump),
        ("return", ret::ret),
        ("tail call", tail_call),
        ("jump table", jump_table::jump_table),
        ("indirect tail call", indirect_tail_call),
    ];
    for (name, rule) in rules {
        if let Some(parsed) = rule(&ctx)? {
            trace!(addr = %format_args!("{:#x}", block.addr), rule = name, "classified block");
            return Ok(parsed);
        }
    }
    Err(DiscoveryError::UnclassifiedTerminator(block.addr))
}

fn branch<A: Architecture>(ctx: &Ctx<'_, A>) -> Result<Option<ParsedBlock>> {
    let TermStmt::Branch {
        cond,
        taken,
        fallthrough,
        ..
    } = &ctx.block.term
    else {
        return Ok(None);
    };
    Ok(Some(ParsedBlock::keep(
        ctx.block,
        ParsedTerm::Branch {
            cond: cond.clone(),
            taken: *taken,
            fallthrough: *fallthrough,
        },
    )))
}

fn jump<A: Architecture>(ctx: &Ctx<'_, A>) -> Result<Option<ParsedBlock>> {
    let Some(target) = ctx.target else {
        return Ok(None);
    };
    if ctx.owner.is_none() || ctx.state.functions.owner(target) != ctx.owner {
        return Ok(None);
    }
    Ok(Some(ParsedBlock::keep(ctx.block, ParsedTerm::Jump { target })))
}

fn tail_call<A: Architecture>(ctx: &Ctx<'_, A>) -> Result<Option<ParsedBlock>> {
    Ok(ctx
        .target
        .map(|target| ParsedBlock::keep(ctx.block, ParsedTerm::TailCall { target })))
}

fn indirect_tail_call<A: Architecture>(ctx: &Ctx<'_, A>) -> Result<Option<ParsedBlock>> {
    Ok(Some(ParsedBlock::keep(
        ctx.block,
        ParsedTerm::IndirectTailCall {
            target: ctx.ip.clone(),
        },
    )))
}
