//! Hand-assembled images shared by the discovery tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use disco_arch::X86_64;
use disco_arch::syscalls::linux_x86_64;
use disco_cfg::{DiscoveryConfig, DiscoveryState, Discoverer};
use disco_mem::{Memory, MemorySegment, PF_R, PF_X};
use tracing_subscriber::EnvFilter;

pub const CODE_BASE: u64 = 0x40_1000;
pub const CODE_SIZE: usize = 0x1000;
pub const DATA_BASE: u64 = 0x40_2000;

/// Byte that never decodes into a supported instruction (`hlt`).
const FILL: u8 = 0xf4;

/// Route `RUST_LOG` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Executable segment at [`CODE_BASE`] with `chunks` placed at their
/// addresses and everything else filled with `hlt`.
pub fn code_segment(chunks: &[(u64, &[u8])]) -> MemorySegment {
    let mut data = vec![FILL; CODE_SIZE];
    for (addr, bytes) in chunks {
        let off = usize::try_from(addr - CODE_BASE).expect("offset fits");
        data[off..off + bytes.len()].copy_from_slice(bytes);
    }
    MemorySegment::new(CODE_BASE, data, PF_R | PF_X)
}

/// Read-only data segment at [`DATA_BASE`] holding little-endian words.
pub fn rodata_segment(words: &[u64]) -> MemorySegment {
    let data = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    MemorySegment::new(DATA_BASE, data, PF_R)
}

pub fn image(chunks: &[(u64, &[u8])]) -> Memory {
    Memory::new(vec![code_segment(chunks)]).expect("valid image")
}

pub fn image_with_rodata(chunks: &[(u64, &[u8])], words: &[u64]) -> Memory {
    Memory::new(vec![code_segment(chunks), rodata_segment(words)]).expect("valid image")
}

pub fn discover(memory: Memory) -> DiscoveryState<X86_64> {
    discover_with(memory, DiscoveryConfig::default(), BTreeMap::new())
}

pub fn discover_with(
    memory: Memory,
    config: DiscoveryConfig,
    symbols: BTreeMap<u64, String>,
) -> DiscoveryState<X86_64> {
    init_tracing();
    Discoverer::new(memory, X86_64::new())
        .with_syscalls(linux_x86_64())
        .with_symbols(symbols)
        .with_config(config)
        .run(CODE_BASE)
        .expect("discovery failed")
}

// Programs, as (address, bytes) chunks.

/// `main` calls `one`, then exits.
///
/// ```text
/// 401000: push rbp
/// 401001: mov rbp, rsp
/// 401004: call 401020
/// 401009: pop rbp
/// 40100a: mov eax, 60
/// 40100f: xor edi, edi
/// 401011: syscall
/// 401013: hlt
/// 401020: mov eax, 1
/// 401025: ret
/// ```
pub const CALL_RET_SYSCALL: &[(u64, &[u8])] = &[
    (
        0x40_1000,
        &[
            0x55, 0x48, 0x89, 0xe5, 0xe8, 0x17, 0x00, 0x00, 0x00, 0x5d, 0xb8, 0x3c, 0x00, 0x00,
            0x00, 0x31, 0xff, 0x0f, 0x05, 0xf4,
        ],
    ),
    (0x40_1020, &[0xb8, 0x01, 0x00, 0x00, 0x00, 0xc3]),
];

/// Switch on `rdi` through a table at [`DATA_BASE`].
///
/// ```text
/// 401000: cmp rdi, 3
/// 401004: ja 401025
/// 401006: jmp [rdi*8 + 0x402000]
/// 40100d: mov eax, 0; ret       (and three more cases)
/// 401025: xor eax, eax; ret
/// ```
pub const SWITCH: &[(u64, &[u8])] = &[
    (
        0x40_1000,
        &[
            0x48, 0x83, 0xff, 0x03, 0x77, 0x1f, 0xff, 0x24, 0xfd, 0x00, 0x20, 0x40, 0x00,
        ],
    ),
    (0x40_100d, &[0xb8, 0x00, 0x00, 0x00, 0x00, 0xc3]),
    (0x40_1013, &[0xb8, 0x01, 0x00, 0x00, 0x00, 0xc3]),
    (0x40_1019, &[0xb8, 0x02, 0x00, 0x00, 0x00, 0xc3]),
    (0x40_101f, &[0xb8, 0x03, 0x00, 0x00, 0x00, 0xc3]),
    (0x40_1025, &[0x31, 0xc0, 0xc3]),
];

pub const SWITCH_TABLE: &[u64] = &[0x40_100d, 0x40_1013, 0x40_1019, 0x40_101f, 0];

/// Count to ten.
///
/// ```text
/// 401000: xor eax, eax
/// 401002: inc eax
/// 401004: cmp eax, 10
/// 401007: jne 401002
/// 401009: ret
/// ```
pub const LOOP: &[(u64, &[u8])] = &[(
    0x40_1000,
    &[0x31, 0xc0, 0xff, 0xc0, 0x83, 0xf8, 0x0a, 0x75, 0xf9, 0xc3],
)];

/// Call followed by a jump into the callee, then dead code.
///
/// ```text
/// 401000: call 401020
/// 401005: jmp 401020
/// 40100a: ret
/// 401020: ret
/// ```
pub const TAIL_CALL: &[(u64, &[u8])] = &[
    (
        0x40_1000,
        &[0xe8, 0x1b, 0x00, 0x00, 0x00, 0xe9, 0x16, 0x00, 0x00, 0x00, 0xc3],
    ),
    (0x40_1020, &[0xc3]),
];
