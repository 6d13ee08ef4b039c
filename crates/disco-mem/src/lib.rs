//! Loaded memory image for control-flow discovery.
//!
//! The image is a set of non-overlapping segments, each with ELF-style
//! permission flags. It is built once by the loader and never mutated.

mod memory;
mod segment;

pub use memory::*;
pub use segment::*;

use thiserror::Error;

/// Segment flag: executable.
pub const PF_X: u32 = 0x1;
/// Segment flag: writable.
pub const PF_W: u32 = 0x2;
/// Segment flag: readable.
pub const PF_R: u32 = 0x4;

/// Maximum number of segments in one image.
pub const MAX_SEGMENTS: usize = 64;

/// Memory image construction and access errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("segment {start:#x}..{end:#x} is empty or inverted")]
    EmptySegment { start: u64, end: u64 },
    #[error("segment data ({data} bytes) exceeds segment size ({size} bytes)")]
    DataBeyondSegment { data: u64, size: u64 },
    #[error("overlapping segments at {0:#x}")]
    OverlappingSegments(u64),
    #[error("too many segments")]
    TooManySegments,
    #[error("address {0:#x} is not mapped")]
    Unmapped(u64),
    #[error("unsupported word size: {0} bytes")]
    BadWordSize(usize),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
