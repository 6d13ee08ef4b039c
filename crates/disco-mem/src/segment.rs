//! Memory segments with permission flags.

use crate::{MemoryError, PF_R, PF_W, PF_X, Result};

/// Permissions of one byte of memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Permissions {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
}

impl Permissions {
    /// Decode ELF-style segment flags.
    pub const fn from_flags(flags: u32) -> Self {
        Self {
            readable: flags & PF_R != 0,
            writable: flags & PF_W != 0,
            executable: flags & PF_X != 0,
        }
    }
}

/// A mapped segment.
///
/// The `data` field contains only the initialized bytes. Anything from
/// `data.len()` up to `end - start` reads as zero (BSS).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemorySegment {
    pub start: u64,
    pub end: u64,
    pub data: Vec<u8>,
    pub flags: u32,
}

impl MemorySegment {
    /// Create a segment covering exactly `data`.
    pub fn new(start: u64, data: Vec<u8>, flags: u32) -> Self {
        let end = start.saturating_add(data.len() as u64);
        Self {
            start,
            end,
            data,
            flags,
        }
    }

    /// Create a segment with a zero-filled tail of `bss` bytes.
    pub fn with_bss(start: u64, data: Vec<u8>, bss: u64, flags: u32) -> Self {
        let end = start.saturating_add(data.len() as u64).saturating_add(bss);
        Self {
            start,
            end,
            data,
            flags,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(MemoryError::EmptySegment {
                start: self.start,
                end: self.end,
            });
        }
        if self.filesz() > self.memsz() {
            return Err(MemoryError::DataBeyondSegment {
                data: self.filesz(),
                size: self.memsz(),
            });
        }
        Ok(())
    }

    /// Size of initialized data.
    pub fn filesz(&self) -> u64 {
        self.data.len() as u64
    }

    /// Total mapped size including BSS.
    pub const fn memsz(&self) -> u64 {
        self.end - self.start
    }

    /// Check if `addr` lies within the segment.
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    pub const fn permissions(&self) -> Permissions {
        Permissions::from_flags(self.flags)
    }

    /// Check if segment is read-only (no write flag).
    pub const fn is_readonly(&self) -> bool {
        (self.flags & PF_W) == 0
    }

    /// Check if segment is executable.
    pub const fn is_executable(&self) -> bool {
        (self.flags & PF_X) != 0
    }

    /// Byte at `addr`, reading BSS as zero.
    pub(crate) fn byte(&self, addr: u64) -> u8 {
        usize::try_from(addr - self.start)
            .ok()
            .and_then(|offset| self.data.get(offset))
            .copied()
            .unwrap_or(0)
    }
}
