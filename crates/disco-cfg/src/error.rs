//! Fatal discovery errors.
//!
//! Decode failures and unresolvable syscalls are not errors; they are logged
//! and discovery carries on. Everything here aborts the pass.

use disco_arch::syscalls::SyscallType;
use disco_ir::WidthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no abstract state recorded for {0:#x}")]
    MissingAbsState(u64),
    #[error("syscall {name}: unsupported argument or return type {ty}")]
    UnsupportedSyscallType { name: &'static str, ty: SyscallType },
    #[error("no classification rule matched the block at {0:#x}")]
    UnclassifiedTerminator(u64),
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error(transparent)]
    Width(#[from] WidthError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
