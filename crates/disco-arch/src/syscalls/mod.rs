//! Syscall personalities.
//!
//! A personality maps syscall numbers to a name and the types of the return
//! value and arguments. Which registers carry the number, the arguments and
//! the results is a property of the [`Architecture`](crate::Architecture).
//!
//! # Usage
//!
//! ```ignore
//! use disco_arch::syscalls::{SyscallTable, SyscallType, linux_x86_64};
//!
//! let table = linux_x86_64()
//!     .with_syscall(500, "custom", SyscallType::Word, &[SyscallType::Word]);
//! ```

mod linux;
mod table;

pub use linux::{linux_x86_64, syscall_nr};
pub use table::{SyscallEntry, SyscallSignature, SyscallTable, SyscallType};
