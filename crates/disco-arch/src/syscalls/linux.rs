//! Linux syscall personality (x86-64 numbering).

use super::table::{SyscallEntry, SyscallTable, SyscallType};

/// Known Linux syscall numbers (x86-64 ABI).
pub mod syscall_nr {
    pub const SYS_READ: u64 = 0;
    pub const SYS_WRITE: u64 = 1;
    pub const SYS_OPEN: u64 = 2;
    pub const SYS_CLOSE: u64 = 3;
    pub const SYS_FSTAT: u64 = 5;
    pub const SYS_LSEEK: u64 = 8;
    pub const SYS_MMAP: u64 = 9;
    pub const SYS_MPROTECT: u64 = 10;
    pub const SYS_MUNMAP: u64 = 11;
    pub const SYS_BRK: u64 = 12;
    pub const SYS_RT_SIGACTION: u64 = 13;
    pub const SYS_RT_SIGPROCMASK: u64 = 14;
    pub const SYS_IOCTL: u64 = 16;
    pub const SYS_PREAD64: u64 = 17;
    pub const SYS_WRITEV: u64 = 20;
    pub const SYS_ACCESS: u64 = 21;
    pub const SYS_MREMAP: u64 = 25;
    pub const SYS_MADVISE: u64 = 28;
    pub const SYS_GETPID: u64 = 39;
    pub const SYS_EXIT: u64 = 60;
    pub const SYS_KILL: u64 = 62;
    pub const SYS_UNAME: u64 = 63;
    pub const SYS_FCNTL: u64 = 72;
    pub const SYS_GETCWD: u64 = 79;
    pub const SYS_READLINK: u64 = 89;
    pub const SYS_GETUID: u64 = 102;
    pub const SYS_GETGID: u64 = 104;
    pub const SYS_GETEUID: u64 = 107;
    pub const SYS_GETEGID: u64 = 108;
    pub const SYS_ARCH_PRCTL: u64 = 158;
    pub const SYS_GETTID: u64 = 186;
    pub const SYS_FUTEX: u64 = 202;
    pub const SYS_SET_TID_ADDRESS: u64 = 218;
    pub const SYS_CLOCK_GETTIME: u64 = 228;
    pub const SYS_EXIT_GROUP: u64 = 231;
    pub const SYS_TGKILL: u64 = 234;
    pub const SYS_OPENAT: u64 = 257;
    pub const SYS_NEWFSTATAT: u64 = 262;
    pub const SYS_SET_ROBUST_LIST: u64 = 273;
    pub const SYS_PRLIMIT64: u64 = 302;
    pub const SYS_GETRANDOM: u64 = 318;
    pub const SYS_RSEQ: u64 = 334;
}

const W: SyscallType = SyscallType::Word;

/// Syscalls commonly reached from statically linked C runtimes.
pub fn linux_x86_64() -> SyscallTable {
    use syscall_nr::{
        SYS_ACCESS, SYS_ARCH_PRCTL, SYS_BRK, SYS_CLOCK_GETTIME, SYS_CLOSE, SYS_EXIT,
        SYS_EXIT_GROUP, SYS_FCNTL, SYS_FSTAT, SYS_FUTEX, SYS_GETCWD, SYS_GETEGID, SYS_GETEUID,
        SYS_GETGID, SYS_GETPID, SYS_GETRANDOM, SYS_GETTID, SYS_GETUID, SYS_IOCTL, SYS_KILL,
        SYS_LSEEK, SYS_MADVISE, SYS_MMAP, SYS_MPROTECT, SYS_MREMAP, SYS_MUNMAP, SYS_NEWFSTATAT,
        SYS_OPEN, SYS_OPENAT, SYS_PREAD64, SYS_PRLIMIT64, SYS_READ, SYS_READLINK,
        SYS_RSEQ, SYS_RT_SIGACTION, SYS_RT_SIGPROCMASK, SYS_SET_ROBUST_LIST,
        SYS_SET_TID_ADDRESS, SYS_TGKILL, SYS_UNAME, SYS_WRITE, SYS_WRITEV,
    };

    [
        SyscallEntry::word(SYS_READ, "read", &[W, W, W]),
        SyscallEntry::word(SYS_WRITE, "write", &[W, W, W]),
        SyscallEntry::word(SYS_OPEN, "open", &[W, W, W]),
        SyscallEntry::word(SYS_CLOSE, "close", &[W]),
        SyscallEntry::word(SYS_FSTAT, "fstat", &[W, W]),
        SyscallEntry::word(SYS_LSEEK, "lseek", &[W, W, W]),
        SyscallEntry::word(SYS_MMAP, "mmap", &[W, W, W, W, W, W]),
        SyscallEntry::word(SYS_MPROTECT, "mprotect", &[W, W, W]),
        SyscallEntry::word(SYS_MUNMAP, "munmap", &[W, W]),
        SyscallEntry::word(SYS_BRK, "brk", &[W]),
        SyscallEntry::word(SYS_RT_SIGACTION, "rt_sigaction", &[W, W, W, W]),
        SyscallEntry::word(SYS_RT_SIGPROCMASK, "rt_sigprocmask", &[W, W, W, W]),
        SyscallEntry::word(SYS_IOCTL, "ioctl", &[W, W, W]),
        SyscallEntry::word(SYS_PREAD64, "pread64", &[W, W, W, W]),
        SyscallEntry::word(SYS_WRITEV, "writev", &[W, W, W]),
        SyscallEntry::word(SYS_ACCESS, "access", &[W, W]),
        SyscallEntry::word(SYS_MREMAP, "mremap", &[W, W, W, W, W]),
        SyscallEntry::word(SYS_MADVISE, "madvise", &[W, W, W]),
        SyscallEntry::word(SYS_GETPID, "getpid", &[]),
        SyscallEntry::void(SYS_EXIT, "exit", &[W]),
        SyscallEntry::word(SYS_KILL, "kill", &[W, W]),
        SyscallEntry::word(SYS_UNAME, "uname", &[W]),
        SyscallEntry::word(SYS_FCNTL, "fcntl", &[W, W, W]),
        SyscallEntry::word(SYS_GETCWD, "getcwd", &[W, W]),
        SyscallEntry::word(SYS_READLINK, "readlink", &[W, W, W]),
        SyscallEntry::word(SYS_GETUID, "getuid", &[]),
        SyscallEntry::word(SYS_GETGID, "getgid", &[]),
        SyscallEntry::word(SYS_GETEUID, "geteuid", &[]),
        SyscallEntry::word(SYS_GETEGID, "getegid", &[]),
        SyscallEntry::word(SYS_ARCH_PRCTL, "arch_prctl", &[W, W]),
        SyscallEntry::word(SYS_GETTID, "gettid", &[]),
        SyscallEntry::word(SYS_FUTEX, "futex", &[W, W, W, W, W, W]),
        SyscallEntry::word(SYS_SET_TID_ADDRESS, "set_tid_address", &[W]),
        SyscallEntry::word(SYS_CLOCK_GETTIME, "clock_gettime", &[W, W]),
        SyscallEntry::void(SYS_EXIT_GROUP, "exit_group", &[W]),
        SyscallEntry::word(SYS_TGKILL, "tgkill", &[W, W, W]),
        SyscallEntry::word(SYS_OPENAT, "openat", &[W, W, W, W]),
        SyscallEntry::word(SYS_NEWFSTATAT, "newfstatat", &[W, W, W, W]),
        SyscallEntry::word(SYS_SET_ROBUST_LIST, "set_robust_list", &[W, W]),
        SyscallEntry::word(SYS_PRLIMIT64, "prlimit64", &[W, W, W, W]),
        SyscallEntry::word(SYS_GETRANDOM, "getrandom", &[W, W, W]),
        SyscallEntry::word(SYS_RSEQ, "rseq", &[W, W, W, W]),
    ]
    .into_iter()
    .fold(SyscallTable::new("linux-x86_64"), SyscallTable::with_entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_exit_is_void() {
        let table = linux_x86_64();
        let exit = table.lookup(syscall_nr::SYS_EXIT).unwrap();
        assert_eq!(exit.name, "exit");
        assert_eq!(exit.ret, SyscallType::Void);
        assert_eq!(exit.args, &[SyscallType::Word]);
        assert_eq!(table.lookup(syscall_nr::SYS_MMAP).unwrap().args.len(), 6);
    }

    #[test]
    fn test_all_linux_args_are_words() {
        let table = linux_x86_64();
        for num in 0..400 {
            if let Some(sig) = table.lookup(num) {
                assert!(sig.args.iter().all(|t| *t == SyscallType::Word), "{}", sig.name);
            }
        }
    }
}
