//! Kernel ABI constants that the libc crate does not export, taken from
//! the corresponding kernel uapi headers.

#![allow(non_upper_case_globals)]

// Kernel-internal restart errnos (include/linux/errno.h). Visible to a
// ptracer between syscall interruption and restart.
pub const ERESTARTSYS: i32 = 512;
pub const ERESTARTNOINTR: i32 = 513;
pub const ERESTARTNOHAND: i32 = 514;
pub const ERESTART_RESTARTBLOCK: i32 = 516;

// linux/futex.h
pub const FUTEX_WAIT: i32 = 0;
pub const FUTEX_WAKE: i32 = 1;
pub const FUTEX_FD: i32 = 2;
pub const FUTEX_REQUEUE: i32 = 3;
pub const FUTEX_CMP_REQUEUE: i32 = 4;
pub const FUTEX_WAKE_OP: i32 = 5;
pub const FUTEX_LOCK_PI: i32 = 6;
pub const FUTEX_UNLOCK_PI: i32 = 7;
pub const FUTEX_TRYLOCK_PI: i32 = 8;
pub const FUTEX_WAIT_BITSET: i32 = 9;
pub const FUTEX_WAKE_BITSET: i32 = 10;
pub const FUTEX_PRIVATE_FLAG: i32 = 128;
pub const FUTEX_CLOCK_REALTIME: i32 = 256;
pub const FUTEX_CMD_MASK: i32 = !(FUTEX_PRIVATE_FLAG | FUTEX_CLOCK_REALTIME);

// asm-generic/ioctl.h decomposition of an ioctl request word.
const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;

pub const IOC_NONE: u32 = 0;
pub const IOC_WRITE: u32 = 1;
pub const IOC_READ: u32 = 2;

pub fn ioc_type(request: u32) -> u32 {
    (request >> IOC_TYPESHIFT) & ((1 << IOC_TYPEBITS) - 1)
}

pub fn ioc_nr(request: u32) -> u32 {
    (request >> IOC_NRSHIFT) & ((1 << IOC_NRBITS) - 1)
}

pub fn ioc_dir(request: u32) -> u32 {
    request >> IOC_DIRSHIFT
}

pub fn ioc_size(request: u32) -> usize {
    ((request >> IOC_SIZESHIFT) & ((1 << IOC_SIZEBITS) - 1)) as usize
}

// Irregular ioctl requests the preparers special-case.
pub const TCGETS: u32 = 0x5401;
pub const TIOCGWINSZ: u32 = 0x5413;
pub const TIOCINQ: u32 = 0x541b;
pub const SIOCGIFNAME: u32 = 0x8910;
pub const SIOCGIFCONF: u32 = 0x8912;
pub const SIOCGIFFLAGS: u32 = 0x8913;
pub const SIOCGIFADDR: u32 = 0x8915;
pub const SIOCGIFMTU: u32 = 0x8921;
pub const SIOCGIFINDEX: u32 = 0x8933;
pub const SIOCETHTOOL: u32 = 0x8946;
pub const SIOCGIWRATE: u32 = 0x8b21;

/// The DRM ioctl namespace ('d'); see linux/drm.h.
pub const DRM_IOC_TYPE: u32 = 0x64;

// linux/net.h socketcall(2) multiplexor numbers.
pub const SYS_SOCKET: i32 = 1;
pub const SYS_BIND: i32 = 2;
pub const SYS_CONNECT: i32 = 3;
pub const SYS_LISTEN: i32 = 4;
pub const SYS_ACCEPT: i32 = 5;
pub const SYS_GETSOCKNAME: i32 = 6;
pub const SYS_GETPEERNAME: i32 = 7;
pub const SYS_SOCKETPAIR: i32 = 8;
pub const SYS_SEND: i32 = 9;
pub const SYS_RECV: i32 = 10;
pub const SYS_SENDTO: i32 = 11;
pub const SYS_RECVFROM: i32 = 12;
pub const SYS_SHUTDOWN: i32 = 13;
pub const SYS_SETSOCKOPT: i32 = 14;
pub const SYS_GETSOCKOPT: i32 = 15;
pub const SYS_SENDMSG: i32 = 16;
pub const SYS_RECVMSG: i32 = 17;
pub const SYS_ACCEPT4: i32 = 18;
pub const SYS_RECVMMSG: i32 = 19;
pub const SYS_SENDMMSG: i32 = 20;

// linux/ipc.h ipc(2) multiplexor numbers (the msg family is all the
// recorder stages; sem/shm arrive here too and draw EINVAL handling).
pub const IPCCALL_MSGSND: i32 = 11;
pub const IPCCALL_MSGRCV: i32 = 12;
pub const IPCCALL_MSGGET: i32 = 13;
pub const IPCCALL_MSGCTL: i32 = 14;
pub const IPC_64: i32 = 0x100;

// msgctl commands (linux/ipc.h, linux/msg.h).
pub const IPC_RMID: i32 = 0;
pub const IPC_SET: i32 = 1;
pub const IPC_STAT: i32 = 2;
pub const IPC_INFO: i32 = 3;
pub const MSG_STAT: i32 = 11;
pub const MSG_INFO: i32 = 12;

// fcntl commands, as the kernel numbers them for both supported
// architectures (the *64 variants only act differently on 32-bit).
pub const F_DUPFD: i32 = 0;
pub const F_GETFD: i32 = 1;
pub const F_SETFD: i32 = 2;
pub const F_GETFL: i32 = 3;
pub const F_SETFL: i32 = 4;
pub const F_GETLK: i32 = 5;
pub const F_SETLK: i32 = 6;
pub const F_SETLKW: i32 = 7;
pub const F_SETOWN: i32 = 8;
pub const F_GETOWN: i32 = 9;
pub const F_SETSIG: i32 = 10;
pub const F_GETSIG: i32 = 11;
pub const F_GETLK64: i32 = 12;
pub const F_SETLK64: i32 = 13;
pub const F_SETLKW64: i32 = 14;
pub const F_SETOWN_EX: i32 = 15;
pub const F_GETOWN_EX: i32 = 16;

// sys/quota.h. quotactl's cmd argument is QCMD(cmd, type); the subcommand
// lives above SUBCMDSHIFT.
pub const SUBCMDSHIFT: u32 = 8;
pub const Q_SYNC: i32 = 0x800001;
pub const Q_QUOTAON: i32 = 0x800002;
pub const Q_QUOTAOFF: i32 = 0x800003;
pub const Q_GETFMT: i32 = 0x800004;
pub const Q_GETINFO: i32 = 0x800005;
pub const Q_SETINFO: i32 = 0x800006;
pub const Q_GETQUOTA: i32 = 0x800007;
pub const Q_SETQUOTA: i32 = 0x800008;

// ELF auxiliary vector keys (elf.h). AT_SYSINFO* are x86-specific.
pub const AT_PHDR: u64 = 3;
pub const AT_PHENT: u64 = 4;
pub const AT_PHNUM: u64 = 5;
pub const AT_PAGESZ: u64 = 6;
pub const AT_BASE: u64 = 7;
pub const AT_FLAGS: u64 = 8;
pub const AT_ENTRY: u64 = 9;
pub const AT_UID: u64 = 11;
pub const AT_EUID: u64 = 12;
pub const AT_GID: u64 = 13;
pub const AT_EGID: u64 = 14;
pub const AT_HWCAP: u64 = 16;
pub const AT_CLKTCK: u64 = 17;
pub const AT_SECURE: u64 = 23;
pub const AT_RANDOM: u64 = 25;
pub const AT_SYSINFO: u64 = 32;
pub const AT_SYSINFO_EHDR: u64 = 33;

// kcmp(2).
pub const KCMP_FILE: i32 = 0;

// sys/resource.h.
pub const PRIO_PROCESS: i32 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioc_decomposition() {
        // TCGETS: type 'T' (0x54), nr 1, no size/dir bits.
        assert_eq!(ioc_type(TCGETS), 0x54);
        assert_eq!(ioc_nr(TCGETS), 1);
        assert_eq!(ioc_dir(TCGETS), IOC_NONE);
        assert_eq!(ioc_size(TCGETS), 0);

        // A synthetic _IOR('a', 3, 24) request.
        let req: u32 = (IOC_READ << 30) | (24 << 16) | (0x61 << 8) | 3;
        assert_eq!(ioc_dir(req), IOC_READ);
        assert_eq!(ioc_size(req), 24);
        assert_eq!(ioc_type(req), 0x61);
        assert_eq!(ioc_nr(req), 3);
    }

    #[test]
    fn futex_cmd_mask_strips_flags() {
        assert_eq!(
            FUTEX_WAIT_BITSET,
            (FUTEX_WAIT_BITSET | FUTEX_PRIVATE_FLAG | FUTEX_CLOCK_REALTIME) & FUTEX_CMD_MASK
        );
    }
}
