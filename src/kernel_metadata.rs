use crate::kernel_abi::{Architecture, SupportedArch};
use crate::kernel_supplement::{
    ERESTARTNOHAND, ERESTARTNOINTR, ERESTARTSYS, ERESTART_RESTARTBLOCK,
};

fn syscall_name_arch<Arch: Architecture>(syscall: i32) -> String {
    match Arch::from_raw_syscall(syscall) {
        Some(s) => s.name().to_owned(),
        None => format!("<unknown-syscall-{}>", syscall),
    }
}

pub fn syscall_name(syscall: i32, arch: SupportedArch) -> String {
    redo_arch_function!(syscall_name_arch, arch, syscall)
}

pub fn errno_name(err: i32) -> String {
    match err {
        0 => "SUCCESS".into(),
        libc::EPERM => "EPERM".into(),
        libc::ENOENT => "ENOENT".into(),
        libc::ESRCH => "ESRCH".into(),
        libc::EINTR => "EINTR".into(),
        libc::EIO => "EIO".into(),
        libc::ENXIO => "ENXIO".into(),
        libc::E2BIG => "E2BIG".into(),
        libc::ENOEXEC => "ENOEXEC".into(),
        libc::EBADF => "EBADF".into(),
        libc::ECHILD => "ECHILD".into(),
        libc::EAGAIN => "EAGAIN".into(),
        libc::ENOMEM => "ENOMEM".into(),
        libc::EACCES => "EACCES".into(),
        libc::EFAULT => "EFAULT".into(),
        libc::ENOTBLK => "ENOTBLK".into(),
        libc::EBUSY => "EBUSY".into(),
        libc::EEXIST => "EEXIST".into(),
        libc::EXDEV => "EXDEV".into(),
        libc::ENODEV => "ENODEV".into(),
        libc::ENOTDIR => "ENOTDIR".into(),
        libc::EISDIR => "EISDIR".into(),
        libc::EINVAL => "EINVAL".into(),
        libc::ENFILE => "ENFILE".into(),
        libc::EMFILE => "EMFILE".into(),
        libc::ENOTTY => "ENOTTY".into(),
        libc::ETXTBSY => "ETXTBSY".into(),
        libc::EFBIG => "EFBIG".into(),
        libc::ENOSPC => "ENOSPC".into(),
        libc::ESPIPE => "ESPIPE".into(),
        libc::EROFS => "EROFS".into(),
        libc::EMLINK => "EMLINK".into(),
        libc::EPIPE => "EPIPE".into(),
        libc::EDOM => "EDOM".into(),
        libc::ERANGE => "ERANGE".into(),
        libc::EDEADLK => "EDEADLK".into(),
        libc::ENAMETOOLONG => "ENAMETOOLONG".into(),
        libc::ENOLCK => "ENOLCK".into(),
        libc::ENOSYS => "ENOSYS".into(),
        libc::ENOTEMPTY => "ENOTEMPTY".into(),
        libc::ELOOP => "ELOOP".into(),
        libc::ENOMSG => "ENOMSG".into(),
        libc::EIDRM => "EIDRM".into(),
        libc::ENODATA => "ENODATA".into(),
        libc::EPROTO => "EPROTO".into(),
        libc::EOVERFLOW => "EOVERFLOW".into(),
        libc::ENOTSOCK => "ENOTSOCK".into(),
        libc::EDESTADDRREQ => "EDESTADDRREQ".into(),
        libc::EMSGSIZE => "EMSGSIZE".into(),
        libc::EPROTOTYPE => "EPROTOTYPE".into(),
        libc::ENOPROTOOPT => "ENOPROTOOPT".into(),
        libc::EPROTONOSUPPORT => "EPROTONOSUPPORT".into(),
        libc::EOPNOTSUPP => "EOPNOTSUPP".into(),
        libc::EAFNOSUPPORT => "EAFNOSUPPORT".into(),
        libc::EADDRINUSE => "EADDRINUSE".into(),
        libc::EADDRNOTAVAIL => "EADDRNOTAVAIL".into(),
        libc::ENETDOWN => "ENETDOWN".into(),
        libc::ENETUNREACH => "ENETUNREACH".into(),
        libc::ECONNABORTED => "ECONNABORTED".into(),
        libc::ECONNRESET => "ECONNRESET".into(),
        libc::ENOBUFS => "ENOBUFS".into(),
        libc::EISCONN => "EISCONN".into(),
        libc::ENOTCONN => "ENOTCONN".into(),
        libc::ETIMEDOUT => "ETIMEDOUT".into(),
        libc::ECONNREFUSED => "ECONNREFUSED".into(),
        libc::EHOSTUNREACH => "EHOSTUNREACH".into(),
        libc::EALREADY => "EALREADY".into(),
        libc::EINPROGRESS => "EINPROGRESS".into(),
        ERESTARTSYS => "ERESTARTSYS".into(),
        ERESTARTNOINTR => "ERESTARTNOINTR".into(),
        ERESTARTNOHAND => "ERESTARTNOHAND".into(),
        ERESTART_RESTARTBLOCK => "ERESTART_RESTARTBLOCK".into(),
        _ => format!("errno({})", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_names() {
        assert_eq!("read", syscall_name(0, SupportedArch::X64));
        assert_eq!("read", syscall_name(3, SupportedArch::X86));
        assert_eq!("<unknown-syscall-9999>", syscall_name(9999, SupportedArch::X64));
    }

    #[test]
    fn errno_names() {
        assert_eq!("EINVAL", errno_name(libc::EINVAL));
        assert_eq!("ERESTARTSYS", errno_name(512));
        assert_eq!("errno(12345)", errno_name(12345));
    }
}
