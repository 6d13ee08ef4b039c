//! Memory image queries.

use crate::segment::{MemorySegment, Permissions};
use crate::{MAX_SEGMENTS, MemoryError, PF_R, PF_X, Result};

/// Immutable, byte-addressable view of a loaded executable.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// Segments sorted by start address, non-overlapping.
    segments: Vec<MemorySegment>,
}

impl Memory {
    /// Build an image from loader-provided segments.
    pub fn new(mut segments: Vec<MemorySegment>) -> Result<Self> {
        if segments.len() > MAX_SEGMENTS {
            return Err(MemoryError::TooManySegments);
        }
        for segment in &segments {
            segment.validate()?;
        }
        segments.sort_by_key(|s| s.start);
        for pair in segments.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(MemoryError::OverlappingSegments(pair[1].start));
            }
        }
        Ok(Self { segments })
    }

    /// Image consisting of a single read/execute segment.
    pub fn from_code(code: Vec<u8>, base: u64) -> Result<Self> {
        Self::new(vec![MemorySegment::new(base, code, PF_R | PF_X)])
    }

    /// All segments, sorted by address.
    pub fn segments(&self) -> &[MemorySegment] {
        &self.segments
    }

    /// Segments that are mapped read-only and not executable.
    pub fn read_only_segments(&self) -> impl Iterator<Item = &MemorySegment> {
        self.segments
            .iter()
            .filter(|s| s.is_readonly() && !s.is_executable())
    }

    /// Segment containing `addr`.
    pub fn segment_at(&self, addr: u64) -> Option<&MemorySegment> {
        let idx = self.segments.partition_point(|s| s.start <= addr);
        let segment = self.segments.get(idx.checked_sub(1)?)?;
        segment.contains(addr).then_some(segment)
    }

    /// Permissions at `addr`, or `None` if unmapped.
    pub fn permissions(&self, addr: u64) -> Option<Permissions> {
        self.segment_at(addr).map(MemorySegment::permissions)
    }

    /// Check if `addr` is a valid branch target (mapped executable).
    pub fn is_code_address(&self, addr: u64) -> bool {
        self.permissions(addr).is_some_and(|p| p.executable)
    }

    /// Check if `addr` is readable but never written.
    pub fn is_read_only(&self, addr: u64) -> bool {
        self.permissions(addr)
            .is_some_and(|p| p.readable && !p.writable)
    }

    /// Read `len` bytes starting at `addr`.
    pub fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        for i in 0..len as u64 {
            let byte_addr = addr.checked_add(i).ok_or(MemoryError::Unmapped(addr))?;
            let segment = self
                .segment_at(byte_addr)
                .ok_or(MemoryError::Unmapped(byte_addr))?;
            out.push(segment.byte(byte_addr));
        }
        Ok(out)
    }

    /// Read a little-endian word of `size` bytes (1, 2, 4 or 8).
    pub fn read_word(&self, addr: u64, size: usize) -> Result<u64> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(MemoryError::BadWordSize(size));
        }
        let bytes = self.read(addr, size)?;
        let mut value = 0u64;
        for (i, byte) in bytes.iter().enumerate() {
            value |= u64::from(*byte) << (i * 8);
        }
        Ok(value)
    }

    /// Read a word only if every byte of it is read-only.
    pub fn read_readonly_word(&self, addr: u64, size: usize) -> Option<u64> {
        let last = addr.checked_add(size.checked_sub(1)? as u64)?;
        if !self.is_read_only(addr) || !self.is_read_only(last) {
            return None;
        }
        self.read_word(addr, size).ok()
    }

    /// Initialized executable bytes starting at `addr`, at most `max` of them.
    pub fn code_bytes(&self, addr: u64, max: usize) -> Option<&[u8]> {
        let segment = self.segment_at(addr)?;
        if !segment.is_executable() {
            return None;
        }
        let offset = usize::try_from(addr - segment.start).ok()?;
        let data = segment.data.get(offset..)?;
        Some(&data[..data.len().min(max)])
    }
}
