//! Syscall classification.

use disco_arch::Architecture;
use disco_arch::syscalls::SyscallType;
use disco_ir::{Block, RegState};
use tracing::warn;

use super::{ParsedBlock, ParsedTerm};
use crate::error::{DiscoveryError, Result};
use crate::state::DiscoveryState;
use crate::transfer::BlockTransfer;

/// Resolve the syscall number of a block ending in a syscall.
///
/// Uses the terminal register expression when it is a constant, otherwise
/// the single concrete value it has under the block's entry state.
fn syscall_number<A: Architecture>(
    state: &DiscoveryState<A>,
    block: &Block,
    regs: &RegState,
) -> Result<Option<u64>> {
    let expr = regs.get(state.arch.syscall_num_reg())?;
    if let Some(num) = expr.as_const() {
        return Ok(Some(num));
    }
    let entry = state
        .abs_states
        .get(&block.addr)
        .ok_or(DiscoveryError::MissingAbsState(block.addr))?;
    Ok(BlockTransfer::run(&state.memory, state.arch.addr_width(), entry, block)
        .eval(expr)
        .as_single())
}

/// Classify a syscall terminator against the syscall table.
///
/// Unresolved or unknown numbers give an `"unknown"` syscall that uses every
/// argument and result register.
pub fn classify_syscall<A: Architecture>(
    state: &DiscoveryState<A>,
    block: &Block,
    regs: &RegState,
) -> Result<ParsedBlock> {
    let arch = &state.arch;
    let arg_regs = arch.syscall_arg_regs();
    let result_regs = arch.syscall_result_regs();
    let num = syscall_number(state, block, regs)?;
    let signature = num.and_then(|num| state.syscalls.lookup(num));

    let term = match signature {
        Some(sig) => {
            if let Some(ty) = sig.args.iter().find(|ty| **ty != SyscallType::Word) {
                return Err(DiscoveryError::UnsupportedSyscallType {
                    name: sig.name,
                    ty: *ty,
                });
            }
            if sig.args.len() > arg_regs.len() {
                warn!(
                    syscall = sig.name,
                    declared = sig.args.len(),
                    available = arg_regs.len(),
                    "syscall declares more arguments than registers; truncating"
                );
            }
            let count = sig.args.len().min(arg_regs.len());
            let results = match sig.ret {
                SyscallType::Void => Vec::new(),
                SyscallType::Word => result_regs.first().copied().into_iter().collect(),
                SyscallType::DoubleWord => {
                    return Err(DiscoveryError::Unreachable(format!(
                        "syscall {} returns {}",
                        sig.name, sig.ret
                    )));
                }
            };
            ParsedTerm::Syscall {
                name: sig.name.to_string(),
                num,
                args: arg_regs[..count].to_vec(),
                results,
                next: block.end(),
            }
        }
        None => ParsedTerm::Syscall {
            name: "unknown".to_string(),
            num,
            args: arg_regs.to_vec(),
            results: result_regs.to_vec(),
            next: block.end(),
        },
    };
    Ok(ParsedBlock::new(block, block.stmts.clone(), term))
}

#[cfg(test)]
mod tests {
    use disco_arch::syscalls::{SyscallEntry, SyscallTable};
    use disco_arch::x86_64::{R8, R9, R10, RAX, RDI, RDX, RSI};
    use disco_ir::{Expr, TermStmt, Width};

    use super::super::classify_block;
    use super::super::tests::{block, code_state, install, regs};
    use super::*;
    use crate::value::AbsValue;

    const W: Width = Width::W64;
    const WORD: SyscallType = SyscallType::Word;

    fn syscall_block(rax: Expr) -> Block {
        let mut r = regs();
        r.set(RAX, rax).unwrap();
        block(0x40_1000, Vec::new(), TermStmt::Syscall(r))
    }

    #[test]
    fn test_exit_uses_one_argument() {
        let mut state = code_state();
        let b = syscall_block(Expr::constant(60, W));
        install(&mut state, 0x40_1000, &b);

        let parsed = classify_block(&state, &b).unwrap();
        assert_eq!(
            parsed.term,
            ParsedTerm::Syscall {
                name: "exit".to_string(),
                num: Some(60),
                args: vec![RDI],
                results: Vec::new(),
                next: 0x40_1005,
            }
        );
    }

    #[test]
    fn test_number_from_entry_state() {
        let mut state = code_state();
        let b = syscall_block(Expr::initial(RAX, W));
        install(&mut state, 0x40_1000, &b);
        let mut entry = state.abs_state(0x40_1000).unwrap().clone();
        entry.set_reg(RAX, AbsValue::constant(1));
        state.set_abs_state(0x40_1000, entry);

        let ParsedTerm::Syscall {
            name,
            args,
            results,
            ..
        } = classify_block(&state, &b).unwrap().term
        else {
            panic!("expected a syscall");
        };
        assert_eq!(name, "write");
        assert_eq!(args, vec![RDI, RSI, RDX]);
        assert_eq!(results, vec![RAX]);
    }

    #[test]
    fn test_unresolved_number_is_unknown() {
        let mut state = code_state();
        let b = syscall_block(Expr::initial(RAX, W));
        install(&mut state, 0x40_1000, &b);

        let ParsedTerm::Syscall {
            name, num, args, ..
        } = classify_block(&state, &b).unwrap().term
        else {
            panic!("expected a syscall");
        };
        assert_eq!(name, "unknown");
        assert_eq!(num, None);
        assert_eq!(args.len(), 6);
    }

    #[test]
    fn test_missing_entry_state_is_fatal() {
        let state = code_state();
        let b = syscall_block(Expr::initial(RAX, W));
        assert!(matches!(
            classify_block(&state, &b),
            Err(DiscoveryError::MissingAbsState(0x40_1000))
        ));
    }

    #[test]
    fn test_excess_arguments_truncate() {
        let mut state = code_state();
        state.syscalls = SyscallTable::new("test").with_entry(SyscallEntry::word(
            500,
            "wide",
            &[WORD, WORD, WORD, WORD, WORD, WORD, WORD],
        ));
        let b = syscall_block(Expr::constant(500, W));
        install(&mut state, 0x40_1000, &b);

        let ParsedTerm::Syscall { args, .. } = classify_block(&state, &b).unwrap().term else {
            panic!("expected a syscall");
        };
        assert_eq!(args.len(), 6);
        assert_eq!(&args[3..], &[R10, R8, R9]);
    }

    #[test]
    fn test_non_word_argument_is_fatal() {
        let mut state = code_state();
        state.syscalls = SyscallTable::new("test").with_syscall(
            501,
            "pair",
            SyscallType::Word,
            &[SyscallType::DoubleWord],
        );
        let b = syscall_block(Expr::constant(501, W));
        install(&mut state, 0x40_1000, &b);
        assert!(matches!(
            classify_block(&state, &b),
            Err(DiscoveryError::UnsupportedSyscallType { name: "pair", .. })
        ));
    }

    #[test]
    fn test_double_word_return_is_unreachable() {
        let mut state = code_state();
        state.syscalls =
            SyscallTable::new("test").with_syscall(502, "big", SyscallType::DoubleWord, &[WORD]);
        let b = syscall_block(Expr::constant(502, W));
        install(&mut state, 0x40_1000, &b);
        assert!(matches!(
            classify_block(&state, &b),
            Err(DiscoveryError::Unreachable(_))
        ));
    }
}
