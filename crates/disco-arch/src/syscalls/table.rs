//! Table-driven syscall signatures.

use std::fmt;

use rustc_hash::FxHashMap;

/// Type of a syscall argument or return value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyscallType {
    /// No value (return type only).
    Void,
    /// One machine word in one register.
    Word,
    /// A value spanning two registers.
    DoubleWord,
}

impl fmt::Display for SyscallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Void => "void",
            Self::Word => "word",
            Self::DoubleWord => "dword",
        };
        f.write_str(name)
    }
}

/// Name and typing of one syscall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyscallSignature {
    pub name: &'static str,
    pub ret: SyscallType,
    pub args: &'static [SyscallType],
}

/// Syscall table entry.
#[derive(Clone, Copy, Debug)]
pub struct SyscallEntry {
    pub num: u64,
    pub signature: SyscallSignature,
}

impl SyscallEntry {
    pub const fn new(
        num: u64,
        name: &'static str,
        ret: SyscallType,
        args: &'static [SyscallType],
    ) -> Self {
        Self {
            num,
            signature: SyscallSignature { name, ret, args },
        }
    }

    /// Syscall returning one word.
    pub const fn word(num: u64, name: &'static str, args: &'static [SyscallType]) -> Self {
        Self::new(num, name, SyscallType::Word, args)
    }

    /// Syscall that does not return a value.
    pub const fn void(num: u64, name: &'static str, args: &'static [SyscallType]) -> Self {
        Self::new(num, name, SyscallType::Void, args)
    }
}

/// Syscall personality: number to signature.
#[derive(Clone, Debug, Default)]
pub struct SyscallTable {
    name: &'static str,
    entries: FxHashMap<u64, SyscallSignature>,
}

impl SyscallTable {
    /// Create an empty table.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: FxHashMap::default(),
        }
    }

    /// Add an entry, replacing any previous entry with the same number.
    #[must_use]
    pub fn with_entry(mut self, entry: SyscallEntry) -> Self {
        self.entries.insert(entry.num, entry.signature);
        self
    }

    /// Add a syscall by its parts.
    #[must_use]
    pub fn with_syscall(
        self,
        num: u64,
        name: &'static str,
        ret: SyscallType,
        args: &'static [SyscallType],
    ) -> Self {
        self.with_entry(SyscallEntry::new(num, name, ret, args))
    }

    /// Personality name (e.g. "linux-x86_64").
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Signature of syscall `num`.
    pub fn lookup(&self, num: u64) -> Option<&SyscallSignature> {
        self.entries.get(&num)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_replace() {
        let table = SyscallTable::new("test")
            .with_entry(SyscallEntry::void(60, "exit", &[SyscallType::Word]))
            .with_syscall(60, "exit2", SyscallType::Void, &[]);
        assert_eq!(table.len(), 1);
        let sig = table.lookup(60).unwrap();
        assert_eq!(sig.name, "exit2");
        assert!(sig.args.is_empty());
        assert!(table.lookup(61).is_none());
    }
}
