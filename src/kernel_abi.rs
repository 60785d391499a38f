//! Per-architecture kernel ABI knowledge: syscall number decoding, calling
//! convention tags, and the structure layouts (sizes and field offsets) the
//! syscall preparers need. Layouts are expressed as offsets rather than
//! repr(C) types so 32-bit tracees can be handled from a 64-bit recorder
//! without transmuting through mismatched native structs.

use crate::kernel_supplement::{
    AT_BASE, AT_CLKTCK, AT_EGID, AT_ENTRY, AT_EUID, AT_FLAGS, AT_GID, AT_HWCAP, AT_PAGESZ,
    AT_PHDR, AT_PHENT, AT_PHNUM, AT_SECURE, AT_SYSINFO, AT_SYSINFO_EHDR, AT_UID,
};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SupportedArch {
    X86,
    X64,
}

#[cfg(target_arch = "x86_64")]
pub const REDO_NATIVE_ARCH: SupportedArch = SupportedArch::X64;

#[cfg(target_arch = "x86")]
pub const REDO_NATIVE_ARCH: SupportedArch = SupportedArch::X86;

/// How a given architecture passes mmap arguments.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MmapCallingSemantics {
    /// x86-ish: all arguments in a struct pointed to by arg1.
    StructArguments,
    /// Arguments in registers.
    RegisterArguments,
}

/// How a given architecture passes select() arguments.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SelectCallingSemantics {
    SelectStructArguments,
    SelectRegisterArguments,
}

/// What clone() expects in its TLS argument.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CloneTlsType {
    /// x86: a struct user_desc*.
    UserDescPointer,
    /// x86-64: a raw pthread pointer.
    PthreadStructurePointer,
}

/// Architecture-independent names for the syscalls the recorder knows how
/// to handle. Per-arch raw numbers decode into this via
/// `Architecture::from_raw_syscall`; a raw number that doesn't decode is an
/// unrecognized syscall (fatal at exit unless the kernel ignored it).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Syscall {
    Accept,
    Accept4,
    Clone,
    EpollWait,
    Execve,
    Exit,
    ExitGroup,
    Fcntl,
    Fcntl64,
    Fgetxattr,
    Futex,
    Getcwd,
    Getdents,
    Getdents64,
    Getpeername,
    Getsockname,
    Getsockopt,
    Getxattr,
    Ioctl,
    Ipc,
    Lgetxattr,
    Mmap,
    Mmap2,
    Msgctl,
    Msgrcv,
    Msgsnd,
    Nanosleep,
    NewSelect,
    Open,
    Pause,
    Poll,
    Ppoll,
    Prctl,
    Pread64,
    Preadv,
    Quotactl,
    Read,
    Readlink,
    Readv,
    Recvfrom,
    Recvmmsg,
    Recvmsg,
    RtSigaction,
    RtSigpending,
    RtSigprocmask,
    RtSigsuspend,
    RtSigtimedwait,
    SchedSetaffinity,
    SchedYield,
    Select,
    Sendfile,
    Sendfile64,
    Sendmmsg,
    Sendmsg,
    Setpriority,
    SetRobustList,
    SetTidAddress,
    Socketcall,
    Sigaction,
    Sigprocmask,
    Sigsuspend,
    Splice,
    Sysctl,
    Wait4,
    Waitid,
    Waitpid,
    Write,
    Writev,
}

impl Syscall {
    pub fn name(self) -> &'static str {
        use Syscall::*;
        match self {
            Accept => "accept",
            Accept4 => "accept4",
            Clone => "clone",
            EpollWait => "epoll_wait",
            Execve => "execve",
            Exit => "exit",
            ExitGroup => "exit_group",
            Fcntl => "fcntl",
            Fcntl64 => "fcntl64",
            Fgetxattr => "fgetxattr",
            Futex => "futex",
            Getcwd => "getcwd",
            Getdents => "getdents",
            Getdents64 => "getdents64",
            Getpeername => "getpeername",
            Getsockname => "getsockname",
            Getsockopt => "getsockopt",
            Getxattr => "getxattr",
            Ioctl => "ioctl",
            Ipc => "ipc",
            Lgetxattr => "lgetxattr",
            Mmap => "mmap",
            Mmap2 => "mmap2",
            Msgctl => "msgctl",
            Msgrcv => "msgrcv",
            Msgsnd => "msgsnd",
            Nanosleep => "nanosleep",
            NewSelect => "_newselect",
            Open => "open",
            Pause => "pause",
            Poll => "poll",
            Ppoll => "ppoll",
            Prctl => "prctl",
            Pread64 => "pread64",
            Preadv => "preadv",
            Quotactl => "quotactl",
            Read => "read",
            Readlink => "readlink",
            Readv => "readv",
            Recvfrom => "recvfrom",
            Recvmmsg => "recvmmsg",
            Recvmsg => "recvmsg",
            RtSigaction => "rt_sigaction",
            RtSigpending => "rt_sigpending",
            RtSigprocmask => "rt_sigprocmask",
            RtSigsuspend => "rt_sigsuspend",
            RtSigtimedwait => "rt_sigtimedwait",
            SchedSetaffinity => "sched_setaffinity",
            SchedYield => "sched_yield",
            Select => "select",
            Sendfile => "sendfile",
            Sendfile64 => "sendfile64",
            Sendmmsg => "sendmmsg",
            Sendmsg => "sendmsg",
            Setpriority => "setpriority",
            SetRobustList => "set_robust_list",
            SetTidAddress => "set_tid_address",
            Socketcall => "socketcall",
            Sigaction => "sigaction",
            Sigprocmask => "sigprocmask",
            Sigsuspend => "sigsuspend",
            Splice => "splice",
            Sysctl => "_sysctl",
            Wait4 => "wait4",
            Waitid => "waitid",
            Waitpid => "waitpid",
            Write => "write",
            Writev => "writev",
        }
    }
}

/// Dispatch an `fn foo<Arch: Architecture>(..)` on a runtime arch tag.
macro_rules! redo_arch_function {
    ($func_name:ident, $arch:expr) => {
        match $arch {
            crate::kernel_abi::SupportedArch::X86 => $func_name::<crate::kernel_abi::X86Arch>(),
            crate::kernel_abi::SupportedArch::X64 => $func_name::<crate::kernel_abi::X64Arch>(),
        }
    };
    ($func_name:ident, $arch:expr, $($exp:expr),+) => {
        match $arch {
            crate::kernel_abi::SupportedArch::X86 => {
                $func_name::<crate::kernel_abi::X86Arch>($($exp),+)
            }
            crate::kernel_abi::SupportedArch::X64 => {
                $func_name::<crate::kernel_abi::X64Arch>($($exp),+)
            }
        }
    };
}

/// The ABI description the recorder needs from each supported
/// architecture: how to decode syscall numbers, the calling-convention
/// oddities, and where the kernel reads and writes inside the structures
/// passed to staged syscalls. Structure knowledge is carried as byte sizes
/// and field offsets.
pub trait Architecture {
    const ARCH: SupportedArch;
    const WORD_SIZE: usize;
    const ELFCLASS: u8;

    const MMAP_SEMANTICS: MmapCallingSemantics;
    const SELECT_SEMANTICS: SelectCallingSemantics;
    const CLONE_TLS_TYPE: CloneTlsType;
    /// Argument registers holding clone()'s parent_tid/tls/child_tid
    /// pointers. x86 swaps tls and child_tid relative to x86-64.
    const CLONE_PARENT_TID_ARG: i32;
    const CLONE_TLS_ARG: i32;
    const CLONE_CHILD_TID_ARG: i32;

    /// The canonical auxv key order the kernel lays down for this
    /// architecture, up to (but not including) AT_RANDOM.
    const AUXV_ORDERING: &'static [u64];

    fn from_raw_syscall(syscallno: i32) -> Option<Syscall>;

    // struct iovec
    const SIZEOF_IOVEC: usize;
    const IOVEC_IOV_BASE: usize;
    const IOVEC_IOV_LEN: usize;

    // struct msghdr
    const SIZEOF_MSGHDR: usize;
    const MSGHDR_MSG_NAME: usize;
    const MSGHDR_MSG_NAMELEN: usize;
    const MSGHDR_MSG_IOV: usize;
    const MSGHDR_MSG_IOVLEN: usize;
    const MSGHDR_MSG_CONTROL: usize;
    const MSGHDR_MSG_CONTROLLEN: usize;

    // struct mmsghdr: msghdr msg_hdr at offset 0, then u32 msg_len
    const SIZEOF_MMSGHDR: usize;
    const MMSGHDR_MSG_LEN: usize;

    const SIZEOF_TIMEVAL: usize;
    const SIZEOF_TIMESPEC: usize;
    const SIZEOF_FLOCK: usize;
    const SIZEOF_FLOCK64: usize;
    const SIZEOF_RUSAGE: usize;
    const SIZEOF_IFREQ: usize;
    /// Offset of the ifr_ifru union (ifru_data et al) within struct ifreq.
    const IFREQ_IFRU: usize = 16;
    const SIZEOF_IFCONF: usize;
    const IFCONF_IFC_BUF: usize;
    const SIZEOF_MSQID64_DS: usize;
    const SIZEOF_DQBLK: usize;

    // struct __sysctl_args
    const SIZEOF_SYSCTL_ARGS: usize;
    const SYSCTL_OLDVAL: usize;
    const SYSCTL_OLDLENP: usize;

    // x86 struct select_args (old select(2) calling convention)
    const SIZEOF_SELECT_ARGS: usize = 20;
    const SELECT_ARGS_READ_FDS: usize = 4;
    const SELECT_ARGS_WRITE_FDS: usize = 8;
    const SELECT_ARGS_EXCEPT_FDS: usize = 12;
    const SELECT_ARGS_TIMEOUT: usize = 16;

    // x86 struct ipc_kludge_args: msgbuf pointer then msgtyp long
    const SIZEOF_IPC_KLUDGE_ARGS: usize;

    // Layouts identical across the supported architectures.
    const SIZEOF_SOCKLEN: usize = 4;
    const SIZEOF_INT: usize = 4;
    const SIZEOF_PID: usize = 4;
    const SIZEOF_LOFF_T: usize = 8;
    const SIZEOF_FD_SET: usize = 128;
    const SIZEOF_POLLFD: usize = 8;
    const SIZEOF_EPOLL_EVENT: usize = 12;
    const SIZEOF_SIGINFO: usize = 128;
    const SIZEOF_WINSIZE: usize = 8;
    /// Kernel struct termios (what TCGETS writes), not the libc one.
    const SIZEOF_TERMIOS: usize = 36;
    const SIZEOF_IWREQ: usize = 32;
    const SIZEOF_ETHTOOL_CMD: usize = 44;
    const SIZEOF_MSGINFO: usize = 32;
    const SIZEOF_DQINFO: usize = 24;
    const SIZEOF_USER_DESC: usize = 16;
    const SIZEOF_F_OWNER_EX: usize = 8;
}

/// Non-generic entry point for syscall decoding.
pub fn syscall_from_raw(syscallno: i32, arch: SupportedArch) -> Option<Syscall> {
    fn decode<Arch: Architecture>(syscallno: i32) -> Option<Syscall> {
        Arch::from_raw_syscall(syscallno)
    }
    redo_arch_function!(decode, arch, syscallno)
}

pub struct X86Arch;
pub struct X64Arch;

impl Architecture for X86Arch {
    const ARCH: SupportedArch = SupportedArch::X86;
    const WORD_SIZE: usize = 4;
    const ELFCLASS: u8 = goblin::elf::header::ELFCLASS32;

    const MMAP_SEMANTICS: MmapCallingSemantics = MmapCallingSemantics::StructArguments;
    const SELECT_SEMANTICS: SelectCallingSemantics = SelectCallingSemantics::SelectStructArguments;
    const CLONE_TLS_TYPE: CloneTlsType = CloneTlsType::UserDescPointer;
    const CLONE_PARENT_TID_ARG: i32 = 3;
    const CLONE_TLS_ARG: i32 = 4;
    const CLONE_CHILD_TID_ARG: i32 = 5;

    const AUXV_ORDERING: &'static [u64] = &[
        AT_SYSINFO,
        AT_SYSINFO_EHDR,
        AT_HWCAP,
        AT_PAGESZ,
        AT_CLKTCK,
        AT_PHDR,
        AT_PHENT,
        AT_PHNUM,
        AT_BASE,
        AT_FLAGS,
        AT_ENTRY,
        AT_UID,
        AT_EUID,
        AT_GID,
        AT_EGID,
        AT_SECURE,
    ];

    fn from_raw_syscall(syscallno: i32) -> Option<Syscall> {
        use Syscall::*;
        Some(match syscallno {
            1 => Exit,
            3 => Read,
            4 => Write,
            5 => Open,
            7 => Waitpid,
            11 => Execve,
            29 => Pause,
            54 => Ioctl,
            55 => Fcntl,
            67 => Sigaction,
            72 => Sigsuspend,
            82 => Select,
            85 => Readlink,
            90 => Mmap,
            97 => Setpriority,
            102 => Socketcall,
            114 => Wait4,
            117 => Ipc,
            120 => Clone,
            126 => Sigprocmask,
            131 => Quotactl,
            141 => Getdents,
            142 => NewSelect,
            145 => Readv,
            146 => Writev,
            149 => Sysctl,
            158 => SchedYield,
            162 => Nanosleep,
            168 => Poll,
            172 => Prctl,
            174 => RtSigaction,
            175 => RtSigprocmask,
            176 => RtSigpending,
            177 => RtSigtimedwait,
            179 => RtSigsuspend,
            180 => Pread64,
            183 => Getcwd,
            187 => Sendfile,
            192 => Mmap2,
            220 => Getdents64,
            221 => Fcntl64,
            229 => Getxattr,
            230 => Lgetxattr,
            231 => Fgetxattr,
            239 => Sendfile64,
            240 => Futex,
            241 => SchedSetaffinity,
            252 => ExitGroup,
            256 => EpollWait,
            258 => SetTidAddress,
            284 => Waitid,
            309 => Ppoll,
            311 => SetRobustList,
            313 => Splice,
            333 => Preadv,
            337 => Recvmmsg,
            345 => Sendmmsg,
            364 => Accept4,
            _ => return None,
        })
    }

    const SIZEOF_IOVEC: usize = 8;
    const IOVEC_IOV_BASE: usize = 0;
    const IOVEC_IOV_LEN: usize = 4;

    const SIZEOF_MSGHDR: usize = 28;
    const MSGHDR_MSG_NAME: usize = 0;
    const MSGHDR_MSG_NAMELEN: usize = 4;
    const MSGHDR_MSG_IOV: usize = 8;
    const MSGHDR_MSG_IOVLEN: usize = 12;
    const MSGHDR_MSG_CONTROL: usize = 16;
    const MSGHDR_MSG_CONTROLLEN: usize = 20;

    const SIZEOF_MMSGHDR: usize = 32;
    const MMSGHDR_MSG_LEN: usize = 28;

    const SIZEOF_TIMEVAL: usize = 8;
    const SIZEOF_TIMESPEC: usize = 8;
    const SIZEOF_FLOCK: usize = 16;
    const SIZEOF_FLOCK64: usize = 24;
    const SIZEOF_RUSAGE: usize = 72;
    const SIZEOF_IFREQ: usize = 32;
    const SIZEOF_IFCONF: usize = 8;
    const IFCONF_IFC_BUF: usize = 4;
    const SIZEOF_MSQID64_DS: usize = 88;
    const SIZEOF_DQBLK: usize = 68;

    const SIZEOF_SYSCTL_ARGS: usize = 40;
    const SYSCTL_OLDVAL: usize = 8;
    const SYSCTL_OLDLENP: usize = 12;

    const SIZEOF_IPC_KLUDGE_ARGS: usize = 8;
}

impl Architecture for X64Arch {
    const ARCH: SupportedArch = SupportedArch::X64;
    const WORD_SIZE: usize = 8;
    const ELFCLASS: u8 = goblin::elf::header::ELFCLASS64;

    const MMAP_SEMANTICS: MmapCallingSemantics = MmapCallingSemantics::RegisterArguments;
    const SELECT_SEMANTICS: SelectCallingSemantics =
        SelectCallingSemantics::SelectRegisterArguments;
    const CLONE_TLS_TYPE: CloneTlsType = CloneTlsType::PthreadStructurePointer;
    const CLONE_PARENT_TID_ARG: i32 = 3;
    const CLONE_TLS_ARG: i32 = 5;
    const CLONE_CHILD_TID_ARG: i32 = 4;

    const AUXV_ORDERING: &'static [u64] = &[
        AT_SYSINFO_EHDR,
        AT_HWCAP,
        AT_PAGESZ,
        AT_CLKTCK,
        AT_PHDR,
        AT_PHENT,
        AT_PHNUM,
        AT_BASE,
        AT_FLAGS,
        AT_ENTRY,
        AT_UID,
        AT_EUID,
        AT_GID,
        AT_EGID,
        AT_SECURE,
    ];

    fn from_raw_syscall(syscallno: i32) -> Option<Syscall> {
        use Syscall::*;
        Some(match syscallno {
            0 => Read,
            1 => Write,
            2 => Open,
            7 => Poll,
            9 => Mmap,
            13 => RtSigaction,
            14 => RtSigprocmask,
            16 => Ioctl,
            17 => Pread64,
            19 => Readv,
            20 => Writev,
            23 => Select,
            24 => SchedYield,
            34 => Pause,
            35 => Nanosleep,
            40 => Sendfile,
            43 => Accept,
            45 => Recvfrom,
            46 => Sendmsg,
            47 => Recvmsg,
            51 => Getsockname,
            52 => Getpeername,
            55 => Getsockopt,
            56 => Clone,
            59 => Execve,
            60 => Exit,
            61 => Wait4,
            69 => Msgsnd,
            70 => Msgrcv,
            71 => Msgctl,
            72 => Fcntl,
            78 => Getdents,
            79 => Getcwd,
            89 => Readlink,
            127 => RtSigpending,
            128 => RtSigtimedwait,
            130 => RtSigsuspend,
            141 => Setpriority,
            156 => Sysctl,
            157 => Prctl,
            179 => Quotactl,
            191 => Getxattr,
            192 => Lgetxattr,
            193 => Fgetxattr,
            202 => Futex,
            203 => SchedSetaffinity,
            217 => Getdents64,
            218 => SetTidAddress,
            231 => ExitGroup,
            232 => EpollWait,
            247 => Waitid,
            271 => Ppoll,
            273 => SetRobustList,
            275 => Splice,
            288 => Accept4,
            295 => Preadv,
            299 => Recvmmsg,
            307 => Sendmmsg,
            _ => return None,
        })
    }

    const SIZEOF_IOVEC: usize = 16;
    const IOVEC_IOV_BASE: usize = 0;
    const IOVEC_IOV_LEN: usize = 8;

    const SIZEOF_MSGHDR: usize = 56;
    const MSGHDR_MSG_NAME: usize = 0;
    const MSGHDR_MSG_NAMELEN: usize = 8;
    const MSGHDR_MSG_IOV: usize = 16;
    const MSGHDR_MSG_IOVLEN: usize = 24;
    const MSGHDR_MSG_CONTROL: usize = 32;
    const MSGHDR_MSG_CONTROLLEN: usize = 40;

    const SIZEOF_MMSGHDR: usize = 64;
    const MMSGHDR_MSG_LEN: usize = 56;

    const SIZEOF_TIMEVAL: usize = 16;
    const SIZEOF_TIMESPEC: usize = 16;
    const SIZEOF_FLOCK: usize = 32;
    const SIZEOF_FLOCK64: usize = 32;
    const SIZEOF_RUSAGE: usize = 144;
    const SIZEOF_IFREQ: usize = 40;
    const SIZEOF_IFCONF: usize = 16;
    const IFCONF_IFC_BUF: usize = 8;
    const SIZEOF_MSQID64_DS: usize = 120;
    const SIZEOF_DQBLK: usize = 72;

    const SIZEOF_SYSCTL_ARGS: usize = 80;
    const SYSCTL_OLDVAL: usize = 16;
    const SYSCTL_OLDLENP: usize = 24;

    // Unused: the ipc() multiplexor is x86-only.
    const SIZEOF_IPC_KLUDGE_ARGS: usize = 16;
}

#[allow(non_camel_case_types)]
pub mod x86 {
    #[repr(C)]
    #[derive(Copy, Clone, Default, Debug)]
    pub struct user_regs_struct {
        pub ebx: i32,
        pub ecx: i32,
        pub edx: i32,
        pub esi: i32,
        pub edi: i32,
        pub ebp: i32,
        pub eax: i32,
        pub xds: i32,
        pub xes: i32,
        pub xfs: i32,
        pub xgs: i32,
        pub orig_eax: i32,
        pub eip: i32,
        pub xcs: i32,
        pub eflags: i32,
        pub esp: i32,
        pub xss: i32,
    }
}

#[allow(non_camel_case_types)]
pub mod x64 {
    #[repr(C)]
    #[derive(Copy, Clone, Default, Debug)]
    pub struct user_regs_struct {
        pub r15: u64,
        pub r14: u64,
        pub r13: u64,
        pub r12: u64,
        pub rbp: u64,
        pub rbx: u64,
        pub r11: u64,
        pub r10: u64,
        pub r9: u64,
        pub r8: u64,
        pub rax: u64,
        pub rcx: u64,
        pub rdx: u64,
        pub rsi: u64,
        pub rdi: u64,
        pub orig_rax: u64,
        pub rip: u64,
        pub cs: u64,
        pub eflags: u64,
        pub rsp: u64,
        pub ss: u64,
        pub fs_base: u64,
        pub gs_base: u64,
        pub ds: u64,
        pub es: u64,
        pub fs: u64,
        pub gs: u64,
    }
}

#[cfg(target_arch = "x86_64")]
assert_eq_size!(libc::user_regs_struct, x64::user_regs_struct);
#[cfg(target_arch = "x86_64")]
assert_eq_align!(libc::user_regs_struct, x64::user_regs_struct);

// Validate the hand-written x86-64 layout constants against libc's native
// definitions wherever libc carries the type.
#[cfg(target_arch = "x86_64")]
const_assert_eq!(X64Arch::SIZEOF_IOVEC, std::mem::size_of::<libc::iovec>());
#[cfg(target_arch = "x86_64")]
const_assert_eq!(X64Arch::SIZEOF_MSGHDR, std::mem::size_of::<libc::msghdr>());
#[cfg(target_arch = "x86_64")]
const_assert_eq!(X64Arch::SIZEOF_MMSGHDR, std::mem::size_of::<libc::mmsghdr>());
#[cfg(target_arch = "x86_64")]
const_assert_eq!(X64Arch::SIZEOF_POLLFD, std::mem::size_of::<libc::pollfd>());
#[cfg(target_arch = "x86_64")]
const_assert_eq!(
    X64Arch::SIZEOF_EPOLL_EVENT,
    std::mem::size_of::<libc::epoll_event>()
);
#[cfg(target_arch = "x86_64")]
const_assert_eq!(X64Arch::SIZEOF_TIMEVAL, std::mem::size_of::<libc::timeval>());
#[cfg(target_arch = "x86_64")]
const_assert_eq!(
    X64Arch::SIZEOF_TIMESPEC,
    std::mem::size_of::<libc::timespec>()
);
#[cfg(target_arch = "x86_64")]
const_assert_eq!(X64Arch::SIZEOF_FLOCK, std::mem::size_of::<libc::flock>());
#[cfg(target_arch = "x86_64")]
const_assert_eq!(X64Arch::SIZEOF_RUSAGE, std::mem::size_of::<libc::rusage>());
#[cfg(target_arch = "x86_64")]
const_assert_eq!(X64Arch::SIZEOF_FD_SET, std::mem::size_of::<libc::fd_set>());
#[cfg(target_arch = "x86_64")]
const_assert_eq!(
    X64Arch::SIZEOF_SIGINFO,
    std::mem::size_of::<libc::siginfo_t>()
);
#[cfg(target_arch = "x86_64")]
const_assert_eq!(X64Arch::SIZEOF_WINSIZE, std::mem::size_of::<libc::winsize>());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_decoding_differs_by_arch() {
        assert_eq!(X64Arch::from_raw_syscall(0), Some(Syscall::Read));
        assert_eq!(X86Arch::from_raw_syscall(3), Some(Syscall::Read));
        assert_eq!(X86Arch::from_raw_syscall(102), Some(Syscall::Socketcall));
        assert_eq!(X64Arch::from_raw_syscall(102), None);
        assert_eq!(X64Arch::from_raw_syscall(-1), None);
    }

    #[test]
    fn msghdr_field_offsets_are_word_scaled() {
        assert_eq!(
            X86Arch::MSGHDR_MSG_CONTROLLEN - X86Arch::MSGHDR_MSG_CONTROL,
            X86Arch::WORD_SIZE
        );
        assert_eq!(
            X64Arch::MSGHDR_MSG_CONTROLLEN - X64Arch::MSGHDR_MSG_CONTROL,
            X64Arch::WORD_SIZE
        );
        assert_eq!(X64Arch::MMSGHDR_MSG_LEN, X64Arch::SIZEOF_MSGHDR);
        assert_eq!(X86Arch::MMSGHDR_MSG_LEN, X86Arch::SIZEOF_MSGHDR);
    }

    #[test]
    fn clone_argument_positions() {
        assert_eq!(X86Arch::CLONE_TLS_ARG, 4);
        assert_eq!(X86Arch::CLONE_CHILD_TID_ARG, 5);
        assert_eq!(X64Arch::CLONE_TLS_ARG, 5);
        assert_eq!(X64Arch::CLONE_CHILD_TID_ARG, 4);
    }
}
