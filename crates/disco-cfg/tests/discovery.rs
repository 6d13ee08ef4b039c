//! End-to-end discovery over small hand-assembled programs.

mod support;

use std::collections::BTreeMap;

use disco_arch::X86_64;
use disco_arch::x86_64::{RAX, RDI, RIP, RSP};
use disco_cfg::{
    CallTarget, DiscoveryConfig, DiscoveryState, FrontierOrder, FunctionSummary, GlobalDataInfo,
    ParsedTerm, strip_call,
};
use disco_ir::BlockLabel;
use support::*;

fn entries(state: &DiscoveryState<X86_64>) -> Vec<u64> {
    state.functions().iter().collect()
}

fn block_addrs(state: &DiscoveryState<X86_64>) -> Vec<u64> {
    state.blocks().blocks().map(|b| b.addr).collect()
}

fn term_at(state: &DiscoveryState<X86_64>, addr: u64) -> ParsedTerm {
    state
        .classify(addr)
        .unwrap_or_else(|err| panic!("classify {addr:#x}: {err}"))
        .term
}

fn region_bounds(state: &DiscoveryState<X86_64>) -> Vec<(u64, u64)> {
    state.blocks().regions().map(|r| (r.start, r.end)).collect()
}

fn labels(state: &DiscoveryState<X86_64>) -> Vec<(u64, BlockLabel)> {
    state.blocks().blocks().map(|b| (b.addr, b.label)).collect()
}

/// Every block has one owner and lies inside that owner's range, and no two
/// regions share a byte.
fn assert_partition(state: &DiscoveryState<X86_64>) {
    let bounds = region_bounds(state);
    for pair in bounds.windows(2) {
        assert!(
            pair[0].1 <= pair[1].0,
            "overlapping regions {:#x?} and {:#x?}",
            pair[0],
            pair[1]
        );
    }
    for block in state.blocks().blocks() {
        let owner = state.owner(block.addr).expect("block without owner");
        let (start, next) = state.functions().range_of(owner);
        assert!(block.addr >= start);
        assert!(next.is_none_or(|next| block.addr < next));
    }
    let entries = entries(state);
    for pair in entries.windows(2) {
        assert_eq!(state.functions().range_of(pair[0]).1, Some(pair[1]));
    }
}

#[test]
fn test_call_ret_syscall() {
    let state = discover(image(CALL_RET_SYSCALL));
    assert!(state.is_settled());
    assert_eq!(entries(&state), vec![0x40_1000, 0x40_1020]);
    assert_eq!(block_addrs(&state), vec![0x40_1000, 0x40_1009, 0x40_1020]);

    assert_eq!(
        term_at(&state, 0x40_1000),
        ParsedTerm::Call {
            target: CallTarget::Direct(0x40_1020),
            return_addr: 0x40_1009,
        }
    );
    let ParsedTerm::Syscall {
        name, num, args, ..
    } = term_at(&state, 0x40_1009)
    else {
        panic!("expected a syscall at 0x401009");
    };
    assert_eq!(name, "exit");
    assert_eq!(num, Some(60));
    assert_eq!(args, vec![RDI]);
    assert_eq!(term_at(&state, 0x40_1020), ParsedTerm::Return);

    assert_eq!(state.owner(0x40_1009), Some(0x40_1000));
    assert_eq!(state.predecessors(0x40_1009).collect::<Vec<_>>(), vec![0x40_1000]);
    // The hlt after exit is reached but cannot be disassembled.
    assert!(state.abs_state(0x40_1013).is_some());
    assert!(state.block(0x40_1013).is_none());
    assert_partition(&state);
}

#[test]
fn test_call_strip_is_idempotent() {
    let state = discover(image(CALL_RET_SYSCALL));
    let block = state.block(0x40_1000).expect("entry block");
    let sp = block.term.regs().get(RSP).expect("sp").clone();

    let (stripped, return_addr) =
        strip_call(state.memory(), &block.stmts, &sp).expect("call push");
    assert_eq!(return_addr, 0x40_1009);
    assert_eq!(stripped, state.classify(0x40_1000).expect("classify").stmts);
    assert!(strip_call(state.memory(), &stripped, &sp).is_none());
}

#[test]
fn test_jump_table() {
    let state = discover(image_with_rodata(SWITCH, SWITCH_TABLE));
    assert_eq!(entries(&state), vec![0x40_1000]);
    let ParsedTerm::Branch {
        taken, fallthrough, ..
    } = term_at(&state, 0x40_1000)
    else {
        panic!("expected a branch at 0x401000");
    };
    assert_eq!((taken, fallthrough), (0x40_1025, 0x40_1006));
    assert_eq!(
        term_at(&state, 0x40_1006),
        ParsedTerm::JumpTable {
            base: DATA_BASE,
            end: DATA_BASE + 0x20,
            targets: vec![0x40_100d, 0x40_1013, 0x40_1019, 0x40_101f],
        }
    );
    assert_eq!(
        state.global_data().get(DATA_BASE),
        Some(GlobalDataInfo::JumpTable(Some(DATA_BASE + 0x20)))
    );
    assert_eq!(
        block_addrs(&state),
        vec![
            0x40_1000, 0x40_1006, 0x40_100d, 0x40_1013, 0x40_1019, 0x40_101f, 0x40_1025
        ]
    );
    for case in [0x40_100d, 0x40_1013, 0x40_1019, 0x40_101f, 0x40_1025] {
        assert_eq!(term_at(&state, case), ParsedTerm::Return);
    }
    assert_partition(&state);
}

#[test]
fn test_loop_splits_block() {
    let state = discover(image(LOOP));
    assert_eq!(block_addrs(&state), vec![0x40_1000, 0x40_1002, 0x40_1009]);

    let head = state.block(0x40_1000).expect("head");
    let body = state.block(0x40_1002).expect("body");
    assert_eq!(head.label, BlockLabel::new(0x40_1000, 0));
    assert_eq!(body.label, BlockLabel::new(0x40_1000, 1));
    assert_eq!(head.end(), 0x40_1002);
    assert_eq!(body.end(), 0x40_1009);
    assert_eq!(
        state.blocks().region_containing(0x40_1005).map(|r| r.start),
        Some(0x40_1000)
    );

    assert_eq!(term_at(&state, 0x40_1000), ParsedTerm::Jump { target: 0x40_1002 });
    let ParsedTerm::Branch {
        taken, fallthrough, ..
    } = term_at(&state, 0x40_1002)
    else {
        panic!("expected a branch at 0x401002");
    };
    assert_eq!((taken, fallthrough), (0x40_1002, 0x40_1009));

    let preds: Vec<u64> = state.predecessors(0x40_1002).collect();
    assert_eq!(preds, vec![0x40_1000, 0x40_1002]);
    assert!(state.is_settled());
}

#[test]
fn test_loop_counter_widens() {
    let state = discover_with(
        image(LOOP),
        DiscoveryConfig::default().with_widen_after(2),
        BTreeMap::new(),
    );
    assert!(state.is_settled());
    let head = state.abs_state(0x40_1002).expect("loop head state");
    assert!(head.reg(RAX).is_top());
    // The entry block is outside the loop.
    assert_eq!(
        state.abs_state(0x40_1000).expect("entry").reg(RSP).as_stack(),
        Some((CODE_BASE, 0))
    );
}

#[test]
fn test_decode_failure_at_entry() {
    let state = discover(image(&[(CODE_BASE, &[0x06])]));
    assert!(state.blocks().is_empty());
    assert_eq!(entries(&state), vec![CODE_BASE]);
}

#[test]
fn test_decode_failure_ends_block() {
    let state = discover(image(&[(CODE_BASE, &[0x55, 0x06])]));
    assert_eq!(block_addrs(&state), vec![CODE_BASE]);
    let block = state.block(CODE_BASE).expect("block");
    assert_eq!(block.end(), 0x40_1001);
    // The fall-through instruction pointer is set explicitly.
    let ip = block.term.regs().get(RIP).expect("ip");
    assert_eq!(ip.as_const(), Some(0x40_1001));
    assert!(state.block(0x40_1001).is_none());
}

#[test]
fn test_disassembly_stops_at_known_region() {
    // 401000: jmp 401010
    // 40100c: mov eax, 0xeb000000   (runs to 401011)
    // 401010: jmp 40100c             (eb fa, starting inside the mov)
    let state = discover(image(&[
        (CODE_BASE, &[0xeb, 0x0e]),
        (0x40_100c, &[0xb8, 0x00, 0x00, 0x00, 0xeb, 0xfa]),
    ]));
    assert_eq!(
        region_bounds(&state),
        vec![(0x40_1000, 0x40_1002), (0x40_1010, 0x40_1012)]
    );
    // The mov would run into the region at 401010, so nothing is decoded.
    assert!(state.block(0x40_100c).is_none());
    assert!(state.abs_state(0x40_100c).is_some());
    assert_eq!(term_at(&state, 0x40_1010), ParsedTerm::Jump { target: 0x40_100c });
    assert_partition(&state);
}

#[test]
fn test_code_after_tail_call_is_a_function() {
    let state = discover(image(TAIL_CALL));
    assert_eq!(entries(&state), vec![0x40_1000, 0x40_100a, 0x40_1020]);
    assert_eq!(
        term_at(&state, 0x40_1005),
        ParsedTerm::TailCall { target: 0x40_1020 }
    );
    assert_eq!(term_at(&state, 0x40_100a), ParsedTerm::Return);
    assert_partition(&state);
}

#[test]
fn test_frontier_order_does_not_matter() {
    let programs = [
        image(CALL_RET_SYSCALL),
        image_with_rodata(SWITCH, SWITCH_TABLE),
        image(LOOP),
        image(TAIL_CALL),
    ];
    for memory in programs {
        let low = discover_with(
            memory.clone(),
            DiscoveryConfig::default().with_frontier_order(FrontierOrder::LowestFirst),
            BTreeMap::new(),
        );
        let high = discover_with(
            memory,
            DiscoveryConfig::default().with_frontier_order(FrontierOrder::HighestFirst),
            BTreeMap::new(),
        );
        assert_eq!(low.abs_states(), high.abs_states());
        assert_eq!(entries(&low), entries(&high));
        assert_eq!(block_addrs(&low), block_addrs(&high));
        assert_eq!(region_bounds(&low), region_bounds(&high));
        assert_eq!(labels(&low), labels(&high));
    }
}

#[test]
fn test_every_block_classifies() {
    let programs = [
        image(CALL_RET_SYSCALL),
        image_with_rodata(SWITCH, SWITCH_TABLE),
        image(LOOP),
        image(TAIL_CALL),
    ];
    for memory in programs {
        let state = discover(memory);
        let parsed = state.classify_all().expect("classification is total");
        assert_eq!(parsed.len(), state.blocks().len());
        for (addr, block) in &parsed {
            assert_eq!(*addr, block.addr);
            assert!(state.abs_state(*addr).is_some());
        }
    }
}

/// `_start: ret` plus a helper at 0x401040 referenced only from rodata.
fn unreferenced_helper() -> disco_mem::Memory {
    image_with_rodata(&[(CODE_BASE, &[0xc3]), (0x40_1040, &[0xc3])], &[0x40_1040, 0])
}

#[test]
fn test_static_data_scan() {
    let plain = discover(unreferenced_helper());
    assert!(plain.block(0x40_1040).is_none());

    let scanned = discover_with(
        unreferenced_helper(),
        DiscoveryConfig::default().with_static_data(true),
        BTreeMap::new(),
    );
    assert!(scanned.block(0x40_1040).is_some());
    assert_eq!(term_at(&scanned, 0x40_1040), ParsedTerm::Return);
    assert!(
        scanned
            .abs_state(0x40_1040)
            .expect("state")
            .regs()
            .iter()
            .all(|v| v.is_top())
    );
}

#[test]
fn test_symbol_seeding() {
    let symbols = BTreeMap::from([
        (CODE_BASE, "_start".to_string()),
        (0x40_1040, "helper".to_string()),
    ]);

    let unseeded = discover_with(
        unreferenced_helper(),
        DiscoveryConfig::default(),
        symbols.clone(),
    );
    assert_eq!(entries(&unseeded), vec![CODE_BASE]);

    let seeded = discover_with(
        unreferenced_helper(),
        DiscoveryConfig::default().with_symbol_seeding(true),
        symbols,
    );
    assert_eq!(entries(&seeded), vec![CODE_BASE, 0x40_1040]);
    let names: Vec<Option<String>> = seeded
        .summaries()
        .expect("summaries")
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(
        names,
        vec![Some("_start".to_string()), Some("helper".to_string())]
    );
}

#[test]
fn test_summaries_json() {
    let state = discover(image(CALL_RET_SYSCALL));
    let summaries = state.summaries().expect("summaries");
    assert_eq!(summaries.len(), 2);

    let main = &summaries[0];
    assert_eq!(main.entry, 0x40_1000);
    assert_eq!(main.blocks.len(), 2);
    // Saved rbp; the return address pushed by the call is not a local.
    assert_eq!(main.stack_frame_size, 8);
    assert_eq!(main.allocas.len(), 1);
    assert_eq!((main.allocas[0].offset, main.allocas[0].size), (-8, 8));

    let one = &summaries[1];
    assert_eq!(one.entry, 0x40_1020);
    assert_eq!(one.stack_frame_size, 0);

    let json = state.summaries_json().expect("json");
    let back: Vec<FunctionSummary> = serde_json::from_str(&json).expect("parse");
    assert_eq!(back, summaries);
}
