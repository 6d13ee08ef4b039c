//! Control-flow discovery for stripped, statically linked executables.
//!
//! Starting from an entry point, [`Discoverer`] disassembles straight-line
//! runs of code, propagates an abstract machine state along the edges it
//! finds and keeps going until nothing changes. Block terminators are
//! classified (calls, returns, jump tables, tail calls, syscalls) from the
//! lowered statements and the abstract state, which is what recovers targets
//! that are not encoded in the instruction itself.
//!
//! The result is a [`DiscoveryState`]: blocks grouped into regions, function
//! entries, data addresses the code was seen to use, and the abstract state
//! at every block.

mod abs_state;
mod classify;
mod config;
mod engine;
mod error;
mod frontier;
mod functions;
mod global_data;
mod region;
mod state;
mod summary;
mod transfer;
mod value;

pub use abs_state::*;
pub use classify::{
    CallTarget, MAX_JUMP_TABLE_ENTRIES, ParsedBlock, ParsedTerm, classify_block, classify_syscall,
    strip_call, strip_return,
};
pub use config::*;
pub use engine::*;
pub use error::*;
pub use frontier::*;
pub use functions::*;
pub use global_data::*;
pub use region::*;
pub use state::*;
pub use summary::*;
pub use transfer::*;
pub use value::*;
