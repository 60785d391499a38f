//! The contract between the syscall handlers and the external tracee
//! driver. A `Task` is one recorded thread: the ptrace layer implements
//! register and memory access, the trace layer implements the `record_*`
//! sinks, and the session layer implements task lookup, the scheduler
//! hooks and remote syscall injection.

use crate::event::Switchable;
use crate::kernel_abi::SupportedArch;
use crate::kernel_supplement::KCMP_FILE;
use crate::registers::Registers;
use crate::remote_ptr::{RemotePtr, Void};
use crate::trace::TraceWriter;
use crate::util::page_size;
use libc::pid_t;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStringExt;

/// A tracee was descheduled inside an in-process buffered syscall. The
/// syscallbuf serves as scratch for such calls; all the handlers need is
/// the syscall number and where the record's payload lives.
#[derive(Copy, Clone, Debug)]
pub struct DeschedRecord {
    pub syscallno: i32,
    pub extra_data: RemotePtr<Void>,
    pub extra_size: usize,
}

/// What the tracee driver knows about a tracee fd, for mmap recording.
#[derive(Clone, Debug)]
pub struct FdStat {
    pub file_name: OsString,
    pub device: u64,
    pub inode: u64,
    pub file_size: u64,
}

pub trait Task {
    fn tid(&self) -> pid_t;
    fn arch(&self) -> SupportedArch;
    /// The number of the syscall currently at the top of this task's
    /// event stack (stable across interruption and restart, unlike the
    /// result register).
    fn current_syscall(&self) -> i32;

    /// A snapshot of the tracee's registers at the last stop.
    fn regs(&self) -> Registers;
    /// Commit a modified register file back to the tracee.
    fn set_regs(&mut self, regs: &Registers);

    /// Read `buf.len()` bytes at `addr`. Failure to read mapped tracee
    /// memory is fatal in the implementation.
    fn read_bytes_helper(&mut self, addr: RemotePtr<Void>, buf: &mut [u8]);
    fn write_bytes_helper(&mut self, addr: RemotePtr<Void>, buf: &[u8]);

    /// Append `num_bytes` at `addr`, read from the tracee, to the trace.
    /// Null `addr` or zero length records nothing.
    fn record_remote(&mut self, addr: RemotePtr<Void>, num_bytes: usize);
    /// Like `record_remote`, but a null `addr` still appends an empty
    /// record (replay relies on seeing one record per expected slot).
    fn record_remote_even_if_null(&mut self, addr: RemotePtr<Void>, num_bytes: usize);
    /// Append a record for `addr` whose payload we already hold locally.
    fn record_local(&mut self, addr: RemotePtr<Void>, buf: &[u8]);

    fn scratch_ptr(&self) -> RemotePtr<Void>;
    fn scratch_size(&self) -> usize;
    fn set_scratch(&mut self, ptr: RemotePtr<Void>, num_bytes: usize);

    /// The desched record if this task is stopped inside a buffered
    /// syscall, else None.
    fn desched_rec(&self) -> Option<DeschedRecord> {
        None
    }

    fn trace_writer(&mut self) -> &mut dyn TraceWriter;

    /// Execute an mmap in the tracee via the remote-syscall injector and
    /// return the mapped address.
    fn inject_mmap(
        &mut self,
        addr: RemotePtr<Void>,
        length: usize,
        prot: i32,
        flags: i32,
        fd: i32,
        offset: u64,
    ) -> RemotePtr<Void>;

    /// Run `f` against a sibling task of the same session (e.g. a
    /// fresh clone child). Does nothing if `tid` is unknown.
    fn with_task(&mut self, tid: pid_t, f: &mut dyn FnMut(&mut dyn Task));

    // Scheduler hooks.
    fn schedule_one_round_robin(&mut self);
    fn set_pseudo_blocked(&mut self, blocked: bool);
    fn set_succ_event_counter(&mut self, count: usize);
    fn update_task_priority(&mut self, tid: pid_t, priority: i32);
    fn set_switchable(&mut self, switchable: Switchable);

    // Bookkeeping shadows kept by the task/session layer.
    fn set_robust_list(&mut self, _addr: RemotePtr<Void>, _num_bytes: usize) {}
    fn set_tid_addr(&mut self, _addr: RemotePtr<Void>) {}
    fn update_sigaction(&mut self, _regs: &Registers) {}
    fn update_sigmask(&mut self, _regs: &Registers) {}
    fn update_prname(&mut self, _addr: RemotePtr<Void>) {}
    fn set_sigsuspend_blocked_sigs(&mut self, _mask: Option<u64>) {}
    fn post_exec_syscall(&mut self) {}

    /// stat() a tracee fd (used to identify file-backed mappings).
    fn stat_fd(&mut self, fd: i32) -> FdStat;
    /// Note a new mapping in the VM bookkeeping.
    fn map_region(
        &mut self,
        addr: RemotePtr<Void>,
        num_bytes: usize,
        prot: i32,
        flags: i32,
        offset_bytes: u64,
        name: &OsStr,
    );

    /// Read a NUL-terminated string out of the tracee, page by page so we
    /// never touch an unmapped page past the terminator.
    fn read_c_str(&mut self, addr: RemotePtr<Void>) -> OsString {
        let mut s: Vec<u8> = Vec::new();
        let mut p = addr;
        loop {
            let bytes_left = page_size() - (p.as_usize() & (page_size() - 1));
            let mut buf = vec![0u8; bytes_left];
            self.read_bytes_helper(p, &mut buf);
            match memchr::memchr(0, &buf) {
                Some(i) => {
                    s.extend_from_slice(&buf[..i]);
                    return OsString::from_vec(s);
                }
                None => {
                    s.extend_from_slice(&buf);
                    p = p + bytes_left;
                }
            }
        }
    }

    /// Does `fd` in this tracee refer to the recorder's own stdout or
    /// stderr? Exact via kcmp when the kernel supports it; otherwise the
    /// fd-number heuristic.
    fn is_recorder_stdio_fd(&self, fd: i32) -> bool {
        is_stdio_fd_via_kcmp(self.tid(), fd)
    }
}

/// kcmp-based comparison of a tracee fd against the recorder's own
/// stdout/stderr.
pub fn is_stdio_fd_via_kcmp(rec_tid: pid_t, fd: i32) -> bool {
    let pid = unsafe { libc::getpid() };

    let r = unsafe {
        libc::syscall(
            libc::SYS_kcmp,
            pid as libc::c_long,
            rec_tid as libc::c_long,
            KCMP_FILE as libc::c_long,
            libc::STDOUT_FILENO as libc::c_long,
            fd as libc::c_long,
        )
    };
    if r < 0 {
        match nix::errno::errno() {
            libc::ENOSYS => return fd == libc::STDOUT_FILENO || fd == libc::STDERR_FILENO,
            // Tracees may try to write to invalid fds.
            libc::EBADF => return false,
            err => {
                fatal!("kcmp failed: {}", crate::kernel_metadata::errno_name(err));
            }
        }
    }
    if r == 0 {
        return true;
    }

    let r = unsafe {
        libc::syscall(
            libc::SYS_kcmp,
            pid as libc::c_long,
            rec_tid as libc::c_long,
            KCMP_FILE as libc::c_long,
            libc::STDERR_FILENO as libc::c_long,
            fd as libc::c_long,
        )
    };
    if r < 0 {
        match nix::errno::errno() {
            libc::EBADF => return false,
            err => {
                fatal!("kcmp failed: {}", crate::kernel_metadata::errno_name(err));
            }
        }
    }
    r == 0
}
