//! When tasks enter syscalls that may block and so must be prepared for a
//! context-switch, and the syscall params include (in)outparams that point
//! to buffers, we need to redirect those arguments to scratch memory. This
//! allows the recorder to serialize execution of what may be multiple
//! blocked syscalls completing "simultaneously" (from the recorder's
//! perspective). After the syscall exits, we restore the data saved in
//! scratch memory to the original buffers.
//!
//! Then during replay, we simply restore the saved data to the tracee's
//! passed-in buffer args and continue on.
//!
//! This is implemented by having `rec_prepare_syscall_arch` set up a record
//! in `param_list` for each syscall in-memory parameter (whether "in" or
//! "out"). Then `done_preparing` is called, which does the actual scratch
//! setup. `process_syscall_results` is called when the syscall is done, to
//! write back scratch results to the real parameters and clean everything
//! up.
//!
//! ... a fly in this ointment is may-block buffered syscalls. If a task
//! blocks in one of those, it will look like it just entered a syscall
//! that needs a scratch buffer. However, it's too late at that point to
//! fudge the syscall args, because processing of the syscall has already
//! begun in the kernel. But that's OK: the syscallbuf code has already
//! swapped out the original buffer-pointers for pointers into the
//! syscallbuf (which acts as its own scratch memory). We just have to
//! worry about setting things up properly for replay, by recording the
//! relevant syscallbuf data at syscall exit.

use crate::event::Switchable;
use crate::event::Switchable::{AllowSwitch, PreventSwitch};
use crate::kernel_abi::{
    Architecture, CloneTlsType, MmapCallingSemantics, SelectCallingSemantics, SupportedArch,
    Syscall,
};
use crate::kernel_metadata::{errno_name, syscall_name};
use crate::kernel_supplement::{
    ioc_dir, ioc_nr, ioc_size, ioc_type, AT_RANDOM, DRM_IOC_TYPE, FUTEX_CMD_MASK,
    FUTEX_CMP_REQUEUE, FUTEX_WAIT, FUTEX_WAIT_BITSET, FUTEX_WAKE, FUTEX_WAKE_OP, IOC_READ,
    IPCCALL_MSGCTL, IPCCALL_MSGGET, IPCCALL_MSGRCV, IPCCALL_MSGSND, IPC_64, IPC_INFO, IPC_STAT,
    MSG_INFO, MSG_STAT, PRIO_PROCESS, Q_GETFMT, Q_GETINFO, Q_GETQUOTA, Q_QUOTAOFF, Q_QUOTAON,
    Q_SETINFO, Q_SETQUOTA, Q_SYNC, SIOCETHTOOL, SIOCGIFADDR, SIOCGIFCONF, SIOCGIFFLAGS,
    SIOCGIFINDEX, SIOCGIFMTU, SIOCGIFNAME, SIOCGIWRATE, SUBCMDSHIFT, SYS_ACCEPT, SYS_ACCEPT4,
    SYS_BIND, SYS_CONNECT, SYS_GETPEERNAME, SYS_GETSOCKNAME, SYS_GETSOCKOPT, SYS_LISTEN,
    SYS_RECV, SYS_RECVFROM, SYS_RECVMMSG, SYS_RECVMSG, SYS_SEND, SYS_SENDMMSG, SYS_SENDMSG,
    SYS_SENDTO, SYS_SETSOCKOPT, SYS_SHUTDOWN, SYS_SOCKET, SYS_SOCKETPAIR, TCGETS, TIOCGWINSZ,
    TIOCINQ,
};
use crate::kernel_supplement::{F_DUPFD, F_GETFD, F_GETFL, F_GETLK, F_GETLK64, F_GETOWN_EX,
    F_SETFD, F_SETFL, F_SETLK, F_SETLK64, F_SETLKW, F_SETLKW64, F_SETOWN, F_SETOWN_EX, F_SETSIG,
};
use crate::log::LogLevel::{LogDebug, LogWarn};
use crate::redo::REDO_MAGIC_SAVE_DATA_FD;
use crate::registers::Registers;
use crate::remote_ptr::{RemotePtr, Void};
use crate::task::Task;
use crate::trace::{RecordInTrace, TraceMappedRegion, TraceTaskEvent};
use crate::util::{ceil_page_size, is_blacklisted_filename, page_size, read_elf_class};
use libc::pid_t;
use std::cmp::min;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::sync::Mutex;

const UNBOUNDED: usize = usize::MAX;

/// Modes used to register syscall memory parameters with TaskSyscallState.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum ArgMode {
    /// Syscall memory parameter is an in-parameter only.
    /// This is only important when we want to move the buffer to scratch
    /// memory so we can modify it without making the modifications
    /// potentially visible to user code. Otherwise, such parameters can
    /// be ignored.
    In,
    /// Syscall memory parameter is out-parameter only.
    Out,
    /// Syscall memory parameter is an in-out parameter.
    InOut,
    /// Syscall memory parameter is an in-out parameter but we must not use
    /// scratch (e.g. for futexes, we must use the actual memory word).
    InOutNoScratch,
}

use ArgMode::*;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum WriteBack {
    WriteBack,
    NoWriteBack,
}

/// Where a parameter's dynamic size comes from once the syscall has
/// executed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum DynamicSize {
    /// No dynamic part; the static max is the size.
    Fixed,
    /// The value at this tracee location after the syscall bounds the size.
    FromMemory {
        ptr: RemotePtr<Void>,
        read_size: usize,
    },
    /// The syscall result register bounds the size.
    FromSyscallResult { read_size: usize },
}

/// Specifies how to determine the size of a syscall memory parameter.
/// There is a static `max_size` determined before the syscall executes
/// (which we need in order to allocate scratch memory), combined with an
/// optional dynamic source evaluated after the syscall has executed. The
/// minimum of the two is used.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct ParamSize {
    max_size: usize,
    source: DynamicSize,
}

impl ParamSize {
    fn fixed(max_size: usize) -> ParamSize {
        ParamSize {
            max_size,
            source: DynamicSize::Fixed,
        }
    }

    /// Dynamic size read from `ptr` after the syscall; the value already
    /// stored there caps the scratch reservation. Used when a tracee
    /// supplies both a buffer and its current length (e.g. `*optlen`).
    fn from_initialized_mem(
        t: &mut dyn Task,
        ptr: RemotePtr<Void>,
        read_size: usize,
    ) -> ParamSize {
        let max_size = if ptr.is_null() {
            0
        } else {
            read_unsigned(t, ptr, read_size) as usize
        };
        ParamSize {
            max_size,
            source: DynamicSize::FromMemory { ptr, read_size },
        }
    }

    /// Dynamic size read from `ptr` after the syscall; no static bound.
    fn from_mem(ptr: RemotePtr<Void>, read_size: usize) -> ParamSize {
        ParamSize {
            max_size: UNBOUNDED,
            source: DynamicSize::FromMemory { ptr, read_size },
        }
    }

    /// Dynamic size taken from the syscall result register, interpreted
    /// at `read_size` bytes.
    fn from_syscall_result(read_size: usize) -> ParamSize {
        ParamSize {
            max_size: UNBOUNDED,
            source: DynamicSize::FromSyscallResult { read_size },
        }
    }

    fn limit_size(self, max: usize) -> ParamSize {
        ParamSize {
            max_size: min(self.max_size, max),
            source: self.source,
        }
    }

    /// True if `other` takes its dynamic size from the same source as
    /// this. When multiple parameters share a source, the source value is
    /// distributed among them in registration order, each taking up to its
    /// max_size bytes. This lets us efficiently record iovec buffers.
    fn is_same_source(&self, other: &ParamSize) -> bool {
        match (self.source, other.source) {
            (
                DynamicSize::FromMemory { ptr: p1, read_size: w1 },
                DynamicSize::FromMemory { ptr: p2, read_size: w2 },
            ) => !p1.is_null() && p1 == p2 && w1 == w2,
            (
                DynamicSize::FromSyscallResult { read_size: w1 },
                DynamicSize::FromSyscallResult { read_size: w2 },
            ) => w1 == w2,
            _ => false,
        }
    }

    /// Compute the actual size after the syscall has executed.
    /// `already_consumed` bytes are subtracted from the dynamic part.
    fn eval(&self, t: &mut dyn Task, already_consumed: usize) -> usize {
        let mut s = self.max_size;
        match self.source {
            DynamicSize::Fixed => {}
            DynamicSize::FromMemory { ptr, read_size } => {
                let mem_size = read_unsigned(t, ptr, read_size) as usize;
                ed_assert!(t, already_consumed <= mem_size);
                s = min(s, mem_size - already_consumed);
            }
            DynamicSize::FromSyscallResult { read_size } => {
                // A failed syscall wrote nothing; clamp to zero rather
                // than interpreting the negative errno as a length.
                let result = if t.regs().syscall_failed() {
                    0
                } else {
                    truncate_unsigned(t.regs().syscall_result(), read_size)
                };
                ed_assert!(t, already_consumed <= result);
                s = min(s, result - already_consumed);
            }
        }
        ed_assert!(t, s < UNBOUNDED);
        s
    }
}

/// Upon successful syscall completion, each parameter in `param_list`
/// consumes its scratch bytes, copying the data to `dest` and recording
/// the data at `dest`. If `ptr_in_reg` is greater than zero, the task's
/// argument register is restored to `dest`. If `ptr_in_memory` is
/// non-null, that location is restored to `dest`.
#[derive(Copy, Clone, Debug)]
struct MemoryParam {
    dest: RemotePtr<Void>,
    scratch: RemotePtr<Void>,
    num_bytes: ParamSize,
    ptr_in_memory: RemotePtr<Void>,
    ptr_in_reg: i32,
    mode: ArgMode,
}

impl Default for MemoryParam {
    fn default() -> MemoryParam {
        MemoryParam {
            dest: RemotePtr::null(),
            scratch: RemotePtr::null(),
            num_bytes: ParamSize::fixed(0),
            ptr_in_memory: RemotePtr::null(),
            ptr_in_reg: 0,
            mode: Out,
        }
    }
}

/// Per-tracee state for the syscall currently being recorded.
struct TaskSyscallState {
    param_list: Vec<MemoryParam>,
    /// Position in the task's scratch region where the next scratch area
    /// will be allocated.
    scratch: RemotePtr<Void>,

    /// Saved syscall-entry registers, used by code paths that modify the
    /// registers temporarily.
    syscall_entry_registers: Option<Registers>,

    /// Saved for the execve exit handler; recording it at entry would be
    /// wrong because the exec may fail.
    exec_saved_event: Option<TraceTaskEvent>,

    /// When nonzero, the syscall is expected to return the given errno and
    /// we should die if it does not. Set when we detect an error condition
    /// during syscall-enter preparation.
    expect_errno: i32,

    /// Records whether the syscall is switchable. Only valid when
    /// `preparation_done` is true.
    switchable: Switchable,

    /// When true, this syscall has already been prepared and should not be
    /// set up again.
    preparation_done: bool,

    /// When true, the scratch area is enabled, otherwise syscall outputs
    /// are written directly to their destinations. Only valid when
    /// `preparation_done` is true.
    scratch_enabled: bool,

    /// When true, record the page of memory below the stack pointer at
    /// exit. Some ioctls have been observed to scribble on it.
    record_page_below_stack_ptr: bool,

    initialized: bool,
}

impl Default for TaskSyscallState {
    fn default() -> TaskSyscallState {
        TaskSyscallState {
            param_list: Vec::new(),
            scratch: RemotePtr::null(),
            syscall_entry_registers: None,
            exec_saved_event: None,
            expect_errno: 0,
            switchable: PreventSwitch,
            preparation_done: false,
            scratch_enabled: false,
            record_page_below_stack_ptr: false,
            initialized: false,
        }
    }
}

impl TaskSyscallState {
    fn init(&mut self, t: &dyn Task) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        self.scratch = t.scratch_ptr();
    }

    /// Identify a syscall memory parameter whose address is in register
    /// `arg`. Returns the address of the data in the tracee (before
    /// scratch relocation), or null if parameters have already been
    /// prepared (the syscall is resuming).
    fn reg_parameter(
        &mut self,
        t: &mut dyn Task,
        arg: i32,
        size: ParamSize,
        mode: ArgMode,
    ) -> RemotePtr<Void> {
        if self.preparation_done {
            return RemotePtr::null();
        }

        let mut param = MemoryParam::default();
        param.dest = RemotePtr::new(t.regs().arg(arg));
        if param.dest.is_null() {
            return RemotePtr::null();
        }
        param.num_bytes = size;
        param.mode = mode;
        if mode != InOutNoScratch {
            param.scratch = self.scratch;
            self.scratch = self.scratch.byte_add(size.max_size);
            align_scratch(&mut self.scratch);
            param.ptr_in_reg = arg;
        }
        self.param_list.push(param);
        param.dest
    }

    /// Identify a syscall memory parameter whose address lives in tracee
    /// memory at `addr_of_buf_ptr`. Returns the address of the data in the
    /// tracee (before scratch relocation), or null if parameters have
    /// already been prepared. `addr_of_buf_ptr` must itself fall within a
    /// previously registered parameter's buffer so it gets relocated too.
    fn mem_ptr_parameter(
        &mut self,
        t: &mut dyn Task,
        addr_of_buf_ptr: RemotePtr<Void>,
        size: ParamSize,
        mode: ArgMode,
    ) -> RemotePtr<Void> {
        if self.preparation_done || addr_of_buf_ptr.is_null() {
            return RemotePtr::null();
        }

        let mut param = MemoryParam::default();
        param.dest = get_remote_ptr(t, addr_of_buf_ptr);
        if param.dest.is_null() {
            return RemotePtr::null();
        }
        param.num_bytes = size;
        param.mode = mode;
        if mode != InOutNoScratch {
            param.scratch = self.scratch;
            self.scratch = self.scratch.byte_add(size.max_size);
            align_scratch(&mut self.scratch);
            param.ptr_in_memory = addr_of_buf_ptr;
        }
        self.param_list.push(param);
        param.dest
    }

    /// Take `ptr`, an address within some registered parameter, to the
    /// corresponding location in that parameter's scratch area. Exactly
    /// one parameter must contain `ptr`.
    fn relocate_pointer_to_scratch(
        &self,
        t: &mut dyn Task,
        ptr: RemotePtr<Void>,
    ) -> RemotePtr<Void> {
        let mut num_relocations = 0;
        let mut result = RemotePtr::null();
        for param in &self.param_list {
            if param.dest <= ptr && ptr < param.dest.byte_add(param.num_bytes.max_size) {
                result = param.scratch.byte_add((ptr - param.dest) as usize);
                num_relocations += 1;
            }
        }
        ed_assert!(
            t,
            num_relocations > 0,
            "Pointer in non-scratch memory being updated to point to scratch?"
        );
        ed_assert!(
            t,
            num_relocations <= 1,
            "Overlapping buffers containing relocated pointer?"
        );
        result
    }

    /// Called when all memory parameters have been identified. If `sw` is
    /// AllowSwitch, sets up scratch memory and updates registers etc. as
    /// necessary. If scratch can't be used, returns PreventSwitch,
    /// otherwise returns `sw`. Idempotent: a second call returns the
    /// cached decision.
    fn done_preparing(&mut self, t: &mut dyn Task, sw: Switchable) -> Switchable {
        if self.preparation_done {
            return self.switchable;
        }
        self.preparation_done = true;

        let scratch_num_bytes = self.scratch.as_usize().wrapping_sub(t.scratch_ptr().as_usize());
        if sw == AllowSwitch && scratch_num_bytes > t.scratch_size() {
            log!(
                LogWarn,
                "'{}' needed a scratch buffer of size {}, but only {} was available. \
                 Disabling context switching: deadlock may follow.",
                syscall_name(t.current_syscall(), t.arch()),
                scratch_num_bytes,
                t.scratch_size()
            );
            self.switchable = PreventSwitch;
        } else {
            self.switchable = sw;
        }
        if self.switchable == PreventSwitch || self.param_list.is_empty() {
            return self.switchable;
        }

        self.scratch_enabled = true;

        // Step 1: initialize all IN/IN_OUT scratch areas with the input
        // data.
        for i in 0..self.param_list.len() {
            let param = self.param_list[i];
            ed_assert!(t, param.num_bytes.max_size < UNBOUNDED);
            if param.mode == InOut || param.mode == In {
                remote_memcpy(t, param.scratch, param.dest, param.num_bytes.max_size);
            }
        }
        // Step 2: update pointers in registers/memory to point to scratch
        // areas. Pointers being relocated must themselves be in scratch
        // memory by now (step 1 copied the data they sit in).
        let mut r = t.regs();
        for i in 0..self.param_list.len() {
            let param = self.param_list[i];
            if param.ptr_in_reg != 0 {
                r.set_arg(param.ptr_in_reg, param.scratch.as_usize());
            }
            if !param.ptr_in_memory.is_null() {
                let p = self.relocate_pointer_to_scratch(t, param.ptr_in_memory);
                set_remote_ptr(t, p, param.scratch);
            }
            // A dynamic size read from memory must track its buffer into
            // scratch.
            if let DynamicSize::FromMemory { ptr, read_size } = param.num_bytes.source {
                if !ptr.is_null() {
                    let relocated = self.relocate_pointer_to_scratch(t, ptr);
                    self.param_list[i].num_bytes.source = DynamicSize::FromMemory {
                        ptr: relocated,
                        read_size,
                    };
                }
            }
        }
        t.set_regs(&r);
        self.switchable
    }

    /// Actual size of parameter `i`, accounting for bytes of the shared
    /// dynamic source already consumed by earlier parameters.
    fn eval_param_size(
        &self,
        t: &mut dyn Task,
        i: usize,
        actual_sizes: &mut Vec<usize>,
    ) -> usize {
        assert_eq!(actual_sizes.len(), i);

        let mut already_consumed = 0;
        for j in 0..i {
            if self.param_list[j]
                .num_bytes
                .is_same_source(&self.param_list[i].num_bytes)
            {
                already_consumed += actual_sizes[j];
            }
        }
        let nb = self.param_list[i].num_bytes;
        let size = nb.eval(t, already_consumed);
        actual_sizes.push(size);
        size
    }

    /// Called when a syscall exits: copy results from scratch memory to
    /// their original destinations, restore registers and in-memory
    /// pointers, and record the output memory in the trace. Pass
    /// NoWriteBack when the kernel did not write anything.
    fn process_syscall_results(&mut self, t: &mut dyn Task, write_back: WriteBack) {
        ed_assert!(t, self.preparation_done);

        // XXX: failed syscalls are recorded as if they succeeded. Dynamic
        // sizes shrink to zero so no spurious bytes get captured, but a
        // partial EFAULT still records the full declared size.
        let mut actual_sizes: Vec<usize> = Vec::new();
        if self.scratch_enabled {
            let scratch_base = t.scratch_ptr();
            let scratch_num_bytes = self.scratch.as_usize() - scratch_base.as_usize();
            let mut data = vec![0u8; scratch_num_bytes];
            t.read_bytes_helper(scratch_base, &mut data);
            let mut r = t.regs();
            // Step 1: compute actual sizes of all buffers and copy
            // outputs from scratch back to their origin.
            for i in 0..self.param_list.len() {
                let param = self.param_list[i];
                let size = self.eval_param_size(t, i, &mut actual_sizes);
                if write_back == WriteBack::WriteBack && (param.mode == InOut || param.mode == Out)
                {
                    let offset = param.scratch.as_usize() - scratch_base.as_usize();
                    t.write_bytes_helper(param.dest, &data[offset..offset + size]);
                }
            }
            // Step 2: restore modified in-memory pointers and registers.
            let mut memory_cleaned_up = false;
            for i in 0..self.param_list.len() {
                let param = self.param_list[i];
                if param.ptr_in_reg != 0 {
                    r.set_arg(param.ptr_in_reg, param.dest.as_usize());
                }
                if !param.ptr_in_memory.is_null() {
                    memory_cleaned_up = true;
                    set_remote_ptr(t, param.ptr_in_memory, param.dest);
                }
            }
            if write_back == WriteBack::WriteBack {
                // Step 3: record all output memory areas. If pointers in
                // memory were fixed up in step 2, record from tracee
                // memory so the restored values are what lands in the
                // trace; otherwise the local scratch copy saves a read.
                for i in 0..self.param_list.len() {
                    let param = self.param_list[i];
                    let size = actual_sizes[i];
                    if param.mode == InOutNoScratch {
                        t.record_remote(param.dest, size);
                    } else if param.mode == InOut || param.mode == Out {
                        if memory_cleaned_up {
                            t.record_remote(param.dest, size);
                        } else {
                            let offset = param.scratch.as_usize() - scratch_base.as_usize();
                            t.record_local(param.dest, &data[offset..offset + size]);
                        }
                    }
                }
            }
            t.set_regs(&r);
        } else {
            for i in 0..self.param_list.len() {
                let size = self.eval_param_size(t, i, &mut actual_sizes);
                t.record_remote(self.param_list[i].dest, size);
            }
        }

        if self.record_page_below_stack_ptr {
            // The SIOC* ioctls have been observed to write to the page
            // below the tracee's stack pointer, as if they had allocated
            // scratch space for themselves. All we can do is capture it.
            t.record_remote(t.regs().sp() - page_size(), page_size());
        }
    }
}

lazy_static! {
    /// Per-task syscall state, keyed by tid. Created on the first entry
    /// hook for a syscall, destroyed on the exit/restart hook.
    static ref SYSCALL_STATES: Mutex<HashMap<pid_t, TaskSyscallState>> =
        Mutex::new(HashMap::new());
}

fn align_scratch(scratch: &mut RemotePtr<Void>) {
    *scratch = RemotePtr::new((scratch.as_usize().wrapping_add(7)) & !7usize);
}

fn word_size(arch: SupportedArch) -> usize {
    match arch {
        SupportedArch::X86 => 4,
        SupportedArch::X64 => 8,
    }
}

fn truncate_unsigned(val: usize, width: usize) -> usize {
    match width {
        1 => val as u8 as usize,
        2 => val as u16 as usize,
        4 => val as u32 as usize,
        8 => val as u64 as usize,
        _ => {
            fatal!("Unknown read size {}", width);
        }
    }
}

fn read_unsigned(t: &mut dyn Task, addr: RemotePtr<Void>, width: usize) -> u64 {
    match width {
        1 => {
            let mut buf = [0u8; 1];
            t.read_bytes_helper(addr, &mut buf);
            buf[0] as u64
        }
        2 => {
            let mut buf = [0u8; 2];
            t.read_bytes_helper(addr, &mut buf);
            u16::from_le_bytes(buf) as u64
        }
        4 => {
            let mut buf = [0u8; 4];
            t.read_bytes_helper(addr, &mut buf);
            u32::from_le_bytes(buf) as u64
        }
        8 => {
            let mut buf = [0u8; 8];
            t.read_bytes_helper(addr, &mut buf);
            u64::from_le_bytes(buf)
        }
        _ => {
            fatal!("Unknown read size {}", width);
        }
    }
}

fn write_unsigned(t: &mut dyn Task, addr: RemotePtr<Void>, val: u64, width: usize) {
    match width {
        4 => t.write_bytes_helper(addr, &(val as u32).to_le_bytes()),
        8 => t.write_bytes_helper(addr, &val.to_le_bytes()),
        _ => {
            fatal!("Unknown write size {}", width);
        }
    }
}

/// Read one tracee word (pointer or unsigned long) at `addr`.
fn read_word_at(t: &mut dyn Task, addr: RemotePtr<Void>) -> usize {
    let width = word_size(t.arch());
    read_unsigned(t, addr, width) as usize
}

fn get_remote_ptr(t: &mut dyn Task, addr: RemotePtr<Void>) -> RemotePtr<Void> {
    RemotePtr::new(read_word_at(t, addr))
}

fn set_remote_ptr(t: &mut dyn Task, addr: RemotePtr<Void>, value: RemotePtr<Void>) {
    let width = word_size(t.arch());
    write_unsigned(t, addr, value.as_usize() as u64, width);
}

fn remote_memcpy(t: &mut dyn Task, dest: RemotePtr<Void>, src: RemotePtr<Void>, len: usize) {
    let mut buf = vec![0u8; len];
    t.read_bytes_helper(src, &mut buf);
    t.write_bytes_helper(dest, &buf);
}

/// Intercept writes to the magic save-data fd before the syscall entry is
/// recorded, so userspace can inject opaque bytes into the trace.
pub fn rec_before_record_syscall_entry(t: &mut dyn Task, syscallno: i32) {
    fn arch_fn<Arch: Architecture>(t: &mut dyn Task, syscallno: i32) {
        if Arch::from_raw_syscall(syscallno) != Some(Syscall::Write) {
            return;
        }
        let fd = t.regs().arg1_signed() as i32;
        if fd != REDO_MAGIC_SAVE_DATA_FD {
            return;
        }
        let buf = RemotePtr::<Void>::new(t.regs().arg2());
        let len = t.regs().arg3();

        ed_assert!(t, !buf.is_null(), "Can't save a null buffer");

        t.record_remote(buf, len);
    }
    let arch = t.arch();
    redo_arch_function!(arch_fn, arch, t, syscallno)
}

fn prepare_recvmsg<Arch: Architecture>(
    t: &mut dyn Task,
    state: &mut TaskSyscallState,
    msgp: RemotePtr<Void>,
    io_size: ParamSize,
) {
    let namelen_ptr = msgp.byte_add(Arch::MSGHDR_MSG_NAMELEN);
    let name_size = ParamSize::from_initialized_mem(t, namelen_ptr, Arch::SIZEOF_SOCKLEN);
    state.mem_ptr_parameter(t, msgp.byte_add(Arch::MSGHDR_MSG_NAME), name_size, Out);

    let msg_iovlen = read_word_at(t, msgp.byte_add(Arch::MSGHDR_MSG_IOVLEN));
    let iovecsp = state.mem_ptr_parameter(
        t,
        msgp.byte_add(Arch::MSGHDR_MSG_IOV),
        ParamSize::fixed(Arch::SIZEOF_IOVEC.wrapping_mul(msg_iovlen)),
        In,
    );
    if !iovecsp.is_null() {
        for i in 0..msg_iovlen {
            let iovp = iovecsp.byte_add(i * Arch::SIZEOF_IOVEC);
            let iov_len = read_word_at(t, iovp.byte_add(Arch::IOVEC_IOV_LEN));
            state.mem_ptr_parameter(
                t,
                iovp.byte_add(Arch::IOVEC_IOV_BASE),
                io_size.limit_size(iov_len),
                Out,
            );
        }
    }

    let controllen_ptr = msgp.byte_add(Arch::MSGHDR_MSG_CONTROLLEN);
    let control_size = ParamSize::from_initialized_mem(t, controllen_ptr, Arch::WORD_SIZE);
    state.mem_ptr_parameter(t, msgp.byte_add(Arch::MSGHDR_MSG_CONTROL), control_size, Out);
}

fn prepare_recvmmsg<Arch: Architecture>(
    t: &mut dyn Task,
    state: &mut TaskSyscallState,
    mmsgp: RemotePtr<Void>,
    vlen: usize,
) {
    for i in 0..vlen {
        let msgp = mmsgp.byte_add(i * Arch::SIZEOF_MMSGHDR);
        // The kernel writes the per-message byte count into msg_len; that
        // is the dynamic source for this message's buffers.
        let msg_len_ptr = msgp.byte_add(Arch::MMSGHDR_MSG_LEN);
        prepare_recvmsg::<Arch>(t, state, msgp, ParamSize::from_mem(msg_len_ptr, 4));
    }
}

fn prepare_msgctl<Arch: Architecture>(
    t: &mut dyn Task,
    state: &mut TaskSyscallState,
    cmd: i32,
    buf_ptr_reg: i32,
) -> Switchable {
    match cmd {
        IPC_STAT | MSG_STAT => {
            state.reg_parameter(t, buf_ptr_reg, ParamSize::fixed(Arch::SIZEOF_MSQID64_DS), Out);
        }
        IPC_INFO | MSG_INFO => {
            state.reg_parameter(t, buf_ptr_reg, ParamSize::fixed(Arch::SIZEOF_MSGINFO), Out);
        }
        _ => {}
    }
    state.done_preparing(t, PreventSwitch)
}

fn prepare_socketcall<Arch: Architecture>(
    t: &mut dyn Task,
    state: &mut TaskSyscallState,
) -> Switchable {
    let word = Arch::WORD_SIZE;
    // The socketcall argument block is an array of unsigned words; see
    // net/socket.c. Offsets below index into that array.
    match t.regs().arg1_signed() as i32 {
        SYS_SOCKET | SYS_CONNECT | SYS_BIND | SYS_LISTEN | SYS_SEND | SYS_SENDTO
        | SYS_SETSOCKOPT | SYS_SHUTDOWN => {}

        // int getsockopt(int sockfd, int level, int optname, void* optval,
        //                socklen_t* optlen)
        SYS_GETSOCKOPT => {
            let argsp = state.reg_parameter(t, 2, ParamSize::fixed(5 * word), In);
            if !argsp.is_null() {
                let optlen_ptr = state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(4 * word),
                    ParamSize::fixed(Arch::SIZEOF_SOCKLEN),
                    InOut,
                );
                let optval_size =
                    ParamSize::from_initialized_mem(t, optlen_ptr, Arch::SIZEOF_SOCKLEN);
                state.mem_ptr_parameter(t, argsp.byte_add(3 * word), optval_size, Out);
            }
        }

        // int socketpair(int domain, int type, int protocol, int sv[2]);
        // values returned in sv
        SYS_SOCKETPAIR => {
            let argsp = state.reg_parameter(t, 2, ParamSize::fixed(4 * word), In);
            if !argsp.is_null() {
                state.mem_ptr_parameter(t, argsp.byte_add(3 * word), ParamSize::fixed(8), Out);
            }
        }

        // int getpeername/getsockname(int sockfd, struct sockaddr* addr,
        //                             socklen_t* addrlen)
        SYS_GETPEERNAME | SYS_GETSOCKNAME => {
            let argsp = state.reg_parameter(t, 2, ParamSize::fixed(3 * word), In);
            if !argsp.is_null() {
                let addrlen_ptr = state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(2 * word),
                    ParamSize::fixed(Arch::SIZEOF_SOCKLEN),
                    InOut,
                );
                let addr_size =
                    ParamSize::from_initialized_mem(t, addrlen_ptr, Arch::SIZEOF_SOCKLEN);
                state.mem_ptr_parameter(t, argsp.byte_add(word), addr_size, Out);
            }
        }

        // ssize_t recv(int sockfd, void* buf, size_t len, int flags)
        SYS_RECV => {
            let argsp = state.reg_parameter(t, 2, ParamSize::fixed(4 * word), In);
            if !argsp.is_null() {
                let len = read_word_at(t, argsp.byte_add(2 * word));
                state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(word),
                    ParamSize::from_syscall_result(word).limit_size(len),
                    Out,
                );
            }
            return state.done_preparing(t, AllowSwitch);
        }

        SYS_ACCEPT | SYS_ACCEPT4 => {
            let nargs = if t.regs().arg1_signed() as i32 == SYS_ACCEPT { 3 } else { 4 };
            let argsp = state.reg_parameter(t, 2, ParamSize::fixed(nargs * word), In);
            if !argsp.is_null() {
                let addrlen_ptr = state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(2 * word),
                    ParamSize::fixed(Arch::SIZEOF_SOCKLEN),
                    InOut,
                );
                let addr_size =
                    ParamSize::from_initialized_mem(t, addrlen_ptr, Arch::SIZEOF_SOCKLEN);
                state.mem_ptr_parameter(t, argsp.byte_add(word), addr_size, Out);
            }
            return state.done_preparing(t, AllowSwitch);
        }

        SYS_RECVFROM => {
            let argsp = state.reg_parameter(t, 2, ParamSize::fixed(6 * word), In);
            if !argsp.is_null() {
                let len = read_word_at(t, argsp.byte_add(2 * word));
                state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(word),
                    ParamSize::from_syscall_result(word).limit_size(len),
                    Out,
                );
                let addrlen_ptr = state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(5 * word),
                    ParamSize::fixed(Arch::SIZEOF_SOCKLEN),
                    InOut,
                );
                let addr_size =
                    ParamSize::from_initialized_mem(t, addrlen_ptr, Arch::SIZEOF_SOCKLEN);
                state.mem_ptr_parameter(t, argsp.byte_add(4 * word), addr_size, Out);
            }
            return state.done_preparing(t, AllowSwitch);
        }

        SYS_RECVMSG => {
            let argsp = state.reg_parameter(t, 2, ParamSize::fixed(3 * word), In);
            if !argsp.is_null() {
                let msgp = state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(word),
                    ParamSize::fixed(Arch::SIZEOF_MSGHDR),
                    InOut,
                );
                if !msgp.is_null() {
                    prepare_recvmsg::<Arch>(
                        t,
                        state,
                        msgp,
                        ParamSize::from_syscall_result(word),
                    );
                }
                let flags = read_word_at(t, argsp.byte_add(2 * word));
                if flags & libc::MSG_DONTWAIT as usize == 0 {
                    return state.done_preparing(t, AllowSwitch);
                }
            }
        }

        SYS_RECVMMSG => {
            let argsp = state.reg_parameter(t, 2, ParamSize::fixed(5 * word), In);
            if !argsp.is_null() {
                let vlen = read_word_at(t, argsp.byte_add(2 * word));
                let mmsgp = state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(word),
                    ParamSize::fixed(Arch::SIZEOF_MMSGHDR.wrapping_mul(vlen)),
                    InOut,
                );
                if !mmsgp.is_null() {
                    prepare_recvmmsg::<Arch>(t, state, mmsgp, vlen);
                }
                let flags = read_word_at(t, argsp.byte_add(3 * word));
                if flags & libc::MSG_DONTWAIT as usize == 0 {
                    return state.done_preparing(t, AllowSwitch);
                }
            }
        }

        // ssize_t sendmsg(int sockfd, const struct msghdr* msg, int flags)
        SYS_SENDMSG => {
            let argsp = RemotePtr::<Void>::new(t.regs().arg2());
            if !argsp.is_null() {
                let flags = read_word_at(t, argsp.byte_add(2 * word));
                if flags & libc::MSG_DONTWAIT as usize == 0 {
                    return state.done_preparing(t, AllowSwitch);
                }
            }
        }

        SYS_SENDMMSG => {
            let argsp = state.reg_parameter(t, 2, ParamSize::fixed(4 * word), In);
            if !argsp.is_null() {
                let vlen = read_word_at(t, argsp.byte_add(2 * word));
                // The kernel writes each mmsghdr's msg_len.
                state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(word),
                    ParamSize::fixed(Arch::SIZEOF_MMSGHDR.wrapping_mul(vlen)),
                    InOut,
                );
                let flags = read_word_at(t, argsp.byte_add(3 * word));
                if flags & libc::MSG_DONTWAIT as usize == 0 {
                    return state.done_preparing(t, AllowSwitch);
                }
            }
        }

        _ => {
            state.expect_errno = libc::EINVAL;
        }
    }
    state.done_preparing(t, PreventSwitch)
}

fn prepare_ioctl<Arch: Architecture>(t: &mut dyn Task, state: &mut TaskSyscallState) {
    let request = t.regs().arg2() as u32;
    let type_ = ioc_type(request);
    let nr = ioc_nr(request);
    let dir = ioc_dir(request);
    let size = ioc_size(request);

    log!(
        LogDebug,
        "handling ioctl({:#x}): type:{:#x} nr:{:#x} dir:{:#x} size:{}",
        request,
        type_,
        nr,
        dir,
        size
    );

    ed_assert!(
        t,
        t.desched_rec().is_none(),
        "Failed to skip past desched ioctl()"
    );

    // Some ioctls are irregular and don't follow the _IOC() conventions;
    // special-case them here.
    match request {
        SIOCETHTOOL => {
            let ifrp = state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_IFREQ), In);
            if !ifrp.is_null() {
                state.mem_ptr_parameter(
                    t,
                    ifrp.byte_add(Arch::IFREQ_IFRU),
                    ParamSize::fixed(Arch::SIZEOF_ETHTOOL_CMD),
                    Out,
                );
            }
            state.record_page_below_stack_ptr = true;
            return;
        }

        SIOCGIFCONF => {
            let ifconfp = state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_IFCONF), InOut);
            if !ifconfp.is_null() {
                // ifc_len (at offset 0) bounds the buffer the kernel
                // fills.
                let ifc_len = read_unsigned(t, ifconfp, 4) as usize;
                state.mem_ptr_parameter(
                    t,
                    ifconfp.byte_add(Arch::IFCONF_IFC_BUF),
                    ParamSize::fixed(ifc_len),
                    Out,
                );
            }
            state.record_page_below_stack_ptr = true;
            return;
        }

        SIOCGIFADDR | SIOCGIFFLAGS | SIOCGIFINDEX | SIOCGIFMTU | SIOCGIFNAME => {
            state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_IFREQ), Out);
            state.record_page_below_stack_ptr = true;
            return;
        }

        SIOCGIWRATE => {
            // SIOCGIWRATE hasn't been observed to write beyond tracees'
            // stacks, but record a stack page in case the behavior is
            // driver-dependent.
            state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_IWREQ), Out);
            state.record_page_below_stack_ptr = true;
            return;
        }

        TCGETS => {
            state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_TERMIOS), Out);
            return;
        }

        TIOCINQ => {
            state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_INT), Out);
            return;
        }

        TIOCGWINSZ => {
            state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_WINSIZE), Out);
            return;
        }

        _ => {}
    }

    // In ioctl language, "_IOC_READ" means "outparam". Both READ and
    // WRITE can be set for inout params.
    if dir & IOC_READ == 0 {
        // If the kernel isn't going to write any data back to us, we hope
        // and pray that the result of the ioctl (observable to the
        // tracee) is deterministic.
        log!(LogDebug, "  (deterministic ioctl, nothing to do)");
        return;
    }

    // DRM ioctls open files behind the recorder's back on behalf of the
    // caller; that can't be recorded truthfully, so refuse the whole
    // namespace.
    if type_ == DRM_IOC_TYPE {
        fatal!(
            "Unhandled DRM(0x64) ioctl nr {:#x}; DRM device access cannot be recorded",
            nr
        );
    }

    if size > 0 {
        // Unknown request, but the direction says the kernel only writes
        // the declared payload; capture that and hope for the best.
        log!(
            LogWarn,
            "Unknown ioctl({:#x}): recording {} declared bytes",
            request,
            size
        );
        state.reg_parameter(t, 3, ParamSize::fixed(size), Out);
        return;
    }

    ed_assert!(
        t,
        false,
        "Unknown ioctl({:#x}) with no declared size: type:{:#x} nr:{:#x} dir:{:#x} addr:{:#x}",
        request,
        type_,
        nr,
        dir,
        t.regs().arg3()
    );
}

/// `t` was descheduled while in a buffered syscall. We don't use scratch
/// memory for the call, because the syscallbuf itself is serving that
/// purpose. More importantly, we *can't* set up scratch for `t`, because
/// it's already in the syscall. The syscallbuf memory gets recorded at
/// syscall exit instead.
fn prepare_deschedule<Arch: Architecture>(t: &mut dyn Task, syscallno: i32) -> Switchable {
    let rec = t.desched_rec().unwrap();
    ed_assert!(
        t,
        syscallno == rec.syscallno,
        "Syscallbuf records syscall {}, but expecting {}",
        syscall_name(rec.syscallno, t.arch()),
        syscall_name(syscallno, t.arch())
    );

    match Arch::from_raw_syscall(syscallno) {
        Some(Syscall::Write) | Some(Syscall::Writev) => {
            let fd = t.regs().arg1_signed() as i32;
            if t.is_recorder_stdio_fd(fd) {
                PreventSwitch
            } else {
                AllowSwitch
            }
        }
        _ => AllowSwitch,
    }
}

fn exec_file_supported(file_name: &OsStr) -> bool {
    match crate::kernel_abi::REDO_NATIVE_ARCH {
        // A 64-bit recorder traces both 32-bit and 64-bit binaries.
        SupportedArch::X64 => true,
        // A 32-bit recorder has to reject 64-bit images; missing or
        // corrupt files will make execve fail normally.
        SupportedArch::X86 => {
            read_elf_class(file_name) != Some(goblin::elf::header::ELFCLASS64)
        }
    }
}

/// Invoked at the syscall-entry stop. Registers the syscall's memory
/// parameters and returns whether the scheduler may park this tracee
/// while the syscall blocks.
pub fn rec_prepare_syscall(t: &mut dyn Task) -> Switchable {
    let mut states = SYSCALL_STATES.lock().unwrap();
    let state = states
        .entry(t.tid())
        .or_insert_with(TaskSyscallState::default);
    state.init(&*t);
    let arch = t.arch();
    redo_arch_function!(rec_prepare_syscall_arch, arch, t, state)
}

fn rec_prepare_syscall_arch<Arch: Architecture>(
    t: &mut dyn Task,
    state: &mut TaskSyscallState,
) -> Switchable {
    let syscallno = t.current_syscall();

    if t.desched_rec().is_some() {
        return prepare_deschedule::<Arch>(t, syscallno);
    }

    if syscallno < 0 {
        // Invalid syscall. Don't let it accidentally match a recognized
        // syscall number below.
        return PreventSwitch;
    }

    let sysc = match Arch::from_raw_syscall(syscallno) {
        Some(s) => s,
        None => return PreventSwitch,
    };

    match sysc {
        Syscall::Splice => {
            state.reg_parameter(t, 2, ParamSize::fixed(Arch::SIZEOF_LOFF_T), InOut);
            state.reg_parameter(t, 4, ParamSize::fixed(Arch::SIZEOF_LOFF_T), InOut);
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Sendfile => {
            state.reg_parameter(t, 3, ParamSize::fixed(Arch::WORD_SIZE), InOut);
            state.done_preparing(t, AllowSwitch)
        }
        Syscall::Sendfile64 => {
            state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_LOFF_T), InOut);
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Clone => {
            state.syscall_entry_registers = Some(t.regs());
            let flags = t.regs().arg1();
            if flags & libc::CLONE_UNTRACED as usize != 0 {
                // We can't let tracees clone untraced tasks, because they
                // can create nondeterminism that we can't replay. So
                // unset the UNTRACED bit and then cover our tracks on
                // exit from clone().
                let mut r = t.regs();
                r.set_arg1(flags & !(libc::CLONE_UNTRACED as usize));
                t.set_regs(&r);
            }
            PreventSwitch
        }

        // Process teardown is the session layer's business; nothing to
        // stage here.
        Syscall::Exit | Syscall::ExitGroup => PreventSwitch,

        Syscall::Execve => {
            if state.syscall_entry_registers.is_none() {
                state.syscall_entry_registers = Some(t.regs());
            }

            let mut r = t.regs();
            let raw_filename = t.read_c_str(RemotePtr::new(r.arg1()));
            if !exec_file_supported(&raw_filename) {
                // Force exec to fail with ENOENT by advancing arg1 to the
                // NUL byte.
                let end = r.arg1() + raw_filename.as_bytes().len();
                r.set_arg1(end);
                t.set_regs(&r);
            }

            let mut cmd_line = Vec::new();
            let mut argv = RemotePtr::<Void>::new(r.arg2());
            loop {
                let p = read_word_at(t, argv);
                if p == 0 {
                    break;
                }
                cmd_line.push(t.read_c_str(RemotePtr::new(p)));
                argv = argv.byte_add(Arch::WORD_SIZE);
            }

            // Save the event; it can't be recorded yet because the exec
            // might fail.
            state.exec_saved_event =
                Some(TraceTaskEvent::for_exec(t.tid(), raw_filename, cmd_line));

            PreventSwitch
        }

        Syscall::Fcntl | Syscall::Fcntl64 => {
            match t.regs().arg2_signed() as i32 {
                F_DUPFD | F_GETFD | F_GETFL | F_SETFL | F_SETFD | F_SETLK | F_SETLK64
                | F_SETOWN | F_SETOWN_EX | F_SETSIG => {}

                F_GETLK => {
                    state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_FLOCK), InOut);
                }

                F_GETLK64 => {
                    state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_FLOCK64), InOut);
                }

                F_GETOWN_EX => {
                    state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_F_OWNER_EX), Out);
                }

                F_SETLKW | F_SETLKW64 => {
                    // SETLKW blocks, but doesn't write any outparam data
                    // to the flock argument, so no need for scratch.
                    return state.done_preparing(t, AllowSwitch);
                }

                _ => {
                    // Unknown command should trigger EINVAL.
                    state.expect_errno = libc::EINVAL;
                }
            }
            state.done_preparing(t, PreventSwitch)
        }

        // int futex(int* uaddr, int op, int val, const struct timespec*
        //           timeout, int* uaddr2, int val3);
        // futex parameters are in-out but they can't be moved to scratch
        // addresses: the address itself is the synchronization identity.
        Syscall::Futex => {
            match t.regs().arg2_signed() as i32 & FUTEX_CMD_MASK {
                FUTEX_WAIT | FUTEX_WAIT_BITSET => {
                    state.reg_parameter(t, 1, ParamSize::fixed(4), InOutNoScratch);
                    return state.done_preparing(t, AllowSwitch);
                }

                FUTEX_CMP_REQUEUE | FUTEX_WAKE_OP => {
                    state.reg_parameter(t, 1, ParamSize::fixed(4), InOutNoScratch);
                    state.reg_parameter(t, 5, ParamSize::fixed(4), InOutNoScratch);
                }

                FUTEX_WAKE => {
                    state.reg_parameter(t, 1, ParamSize::fixed(4), InOutNoScratch);
                }

                _ => {
                    state.expect_errno = libc::EINVAL;
                }
            }
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Ipc => {
            match t.regs().arg1_signed() as i32 {
                IPCCALL_MSGCTL => {
                    let cmd = t.regs().arg3_signed() as i32 & !IPC_64;
                    return prepare_msgctl::<Arch>(t, state, cmd, 5);
                }

                IPCCALL_MSGGET => {}

                IPCCALL_MSGSND => {
                    return state.done_preparing(t, AllowSwitch);
                }

                IPCCALL_MSGRCV => {
                    let msgsize = t.regs().arg3();
                    let kluge_args = state.reg_parameter(
                        t,
                        5,
                        ParamSize::fixed(Arch::SIZEOF_IPC_KLUDGE_ARGS),
                        In,
                    );
                    if !kluge_args.is_null() {
                        // The msgbuf pointer is the first kludge field;
                        // the buffer is a long mtype followed by the
                        // message body.
                        state.mem_ptr_parameter(
                            t,
                            kluge_args,
                            ParamSize::fixed(Arch::WORD_SIZE + msgsize),
                            Out,
                        );
                    }
                    return state.done_preparing(t, AllowSwitch);
                }

                _ => {
                    state.expect_errno = libc::EINVAL;
                }
            }
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Msgctl => {
            let cmd = t.regs().arg2_signed() as i32 & !IPC_64;
            prepare_msgctl::<Arch>(t, state, cmd, 3)
        }

        Syscall::Msgrcv => {
            let msgsize = t.regs().arg3();
            state.reg_parameter(t, 2, ParamSize::fixed(Arch::WORD_SIZE + msgsize), Out);
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Msgsnd => state.done_preparing(t, AllowSwitch),

        Syscall::Socketcall => prepare_socketcall::<Arch>(t, state),

        Syscall::Select | Syscall::NewSelect => {
            if sysc == Syscall::Select
                && Arch::SELECT_SEMANTICS == SelectCallingSemantics::SelectStructArguments
            {
                let argsp =
                    state.reg_parameter(t, 1, ParamSize::fixed(Arch::SIZEOF_SELECT_ARGS), In);
                if !argsp.is_null() {
                    state.mem_ptr_parameter(
                        t,
                        argsp.byte_add(Arch::SELECT_ARGS_READ_FDS),
                        ParamSize::fixed(Arch::SIZEOF_FD_SET),
                        InOut,
                    );
                    state.mem_ptr_parameter(
                        t,
                        argsp.byte_add(Arch::SELECT_ARGS_WRITE_FDS),
                        ParamSize::fixed(Arch::SIZEOF_FD_SET),
                        InOut,
                    );
                    state.mem_ptr_parameter(
                        t,
                        argsp.byte_add(Arch::SELECT_ARGS_EXCEPT_FDS),
                        ParamSize::fixed(Arch::SIZEOF_FD_SET),
                        InOut,
                    );
                    state.mem_ptr_parameter(
                        t,
                        argsp.byte_add(Arch::SELECT_ARGS_TIMEOUT),
                        ParamSize::fixed(Arch::SIZEOF_TIMEVAL),
                        InOut,
                    );
                }
            } else {
                state.reg_parameter(t, 2, ParamSize::fixed(Arch::SIZEOF_FD_SET), InOut);
                state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_FD_SET), InOut);
                state.reg_parameter(t, 4, ParamSize::fixed(Arch::SIZEOF_FD_SET), InOut);
                state.reg_parameter(t, 5, ParamSize::fixed(Arch::SIZEOF_TIMEVAL), InOut);
            }
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Recvfrom => {
            let buf_size =
                ParamSize::from_syscall_result(Arch::WORD_SIZE).limit_size(t.regs().arg3());
            state.reg_parameter(t, 2, buf_size, Out);
            let addrlen_ptr =
                state.reg_parameter(t, 6, ParamSize::fixed(Arch::SIZEOF_SOCKLEN), InOut);
            let addr_size = ParamSize::from_initialized_mem(t, addrlen_ptr, Arch::SIZEOF_SOCKLEN);
            state.reg_parameter(t, 5, addr_size, Out);
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Recvmsg => {
            let msgp = state.reg_parameter(t, 2, ParamSize::fixed(Arch::SIZEOF_MSGHDR), InOut);
            if !msgp.is_null() {
                prepare_recvmsg::<Arch>(
                    t,
                    state,
                    msgp,
                    ParamSize::from_syscall_result(Arch::WORD_SIZE),
                );
            }
            if t.regs().arg3() & libc::MSG_DONTWAIT as usize == 0 {
                return state.done_preparing(t, AllowSwitch);
            }
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Recvmmsg => {
            let vlen = t.regs().arg3() as u32 as usize;
            let mmsgp = state.reg_parameter(
                t,
                2,
                ParamSize::fixed(Arch::SIZEOF_MMSGHDR.wrapping_mul(vlen)),
                InOut,
            );
            if !mmsgp.is_null() {
                prepare_recvmmsg::<Arch>(t, state, mmsgp, vlen);
            }
            if t.regs().arg4() & libc::MSG_DONTWAIT as usize == 0 {
                return state.done_preparing(t, AllowSwitch);
            }
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Sendmsg => {
            if t.regs().arg3() & libc::MSG_DONTWAIT as usize == 0 {
                return state.done_preparing(t, AllowSwitch);
            }
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Sendmmsg => {
            let vlen = t.regs().arg3() as u32 as usize;
            // The kernel writes each mmsghdr's msg_len.
            state.reg_parameter(
                t,
                2,
                ParamSize::fixed(Arch::SIZEOF_MMSGHDR.wrapping_mul(vlen)),
                InOut,
            );
            if t.regs().arg4() & libc::MSG_DONTWAIT as usize == 0 {
                return state.done_preparing(t, AllowSwitch);
            }
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Getsockname | Syscall::Getpeername => {
            let addrlen_ptr =
                state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_SOCKLEN), InOut);
            let addr_size = ParamSize::from_initialized_mem(t, addrlen_ptr, Arch::SIZEOF_SOCKLEN);
            state.reg_parameter(t, 2, addr_size, Out);
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Getsockopt => {
            let optlen_ptr =
                state.reg_parameter(t, 5, ParamSize::fixed(Arch::SIZEOF_SOCKLEN), InOut);
            let optval_size = ParamSize::from_initialized_mem(t, optlen_ptr, Arch::SIZEOF_SOCKLEN);
            state.reg_parameter(t, 4, optval_size, Out);
            state.done_preparing(t, PreventSwitch)
        }

        // ssize_t read(int fd, void* buf, size_t count)
        Syscall::Read | Syscall::Pread64 => {
            let buf_size =
                ParamSize::from_syscall_result(Arch::WORD_SIZE).limit_size(t.regs().arg3());
            state.reg_parameter(t, 2, buf_size, Out);
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Accept | Syscall::Accept4 => {
            let addrlen_ptr =
                state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_SOCKLEN), InOut);
            let addr_size = ParamSize::from_initialized_mem(t, addrlen_ptr, Arch::SIZEOF_SOCKLEN);
            state.reg_parameter(t, 2, addr_size, Out);
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Getcwd => {
            let buf_size =
                ParamSize::from_syscall_result(Arch::WORD_SIZE).limit_size(t.regs().arg2());
            state.reg_parameter(t, 1, buf_size, Out);
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Getdents | Syscall::Getdents64 => {
            let buf_size = ParamSize::from_syscall_result(4).limit_size(t.regs().arg3());
            state.reg_parameter(t, 2, buf_size, Out);
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Readlink => {
            let buf_size =
                ParamSize::from_syscall_result(Arch::WORD_SIZE).limit_size(t.regs().arg3());
            state.reg_parameter(t, 2, buf_size, Out);
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Write | Syscall::Writev => {
            // Tracee writes to the recorder's stdout/stderr are echoed
            // during replay, and those echoes must appear in the order
            // the writes were performed during recording. If such a write
            // were interruptible, another thread could start its own
            // write and we wouldn't know which order the kernel performs
            // them in. So writes to our own stdout/stderr are
            // non-interruptible; this theoretically risks deadlock with
            // an external program reading our output through a pipe, but
            // that seems unlikely to bite in practice.
            let fd = t.regs().arg1_signed() as i32;
            if t.is_recorder_stdio_fd(fd) {
                PreventSwitch
            } else {
                AllowSwitch
            }
        }

        // ssize_t readv(int fd, const struct iovec* iov, int iovcnt)
        // ssize_t preadv(int fd, const struct iovec* iov, int iovcnt,
        //                off_t offset)
        Syscall::Readv | Syscall::Preadv => {
            let iovcnt = t.regs().arg3_signed().max(0) as usize;
            let iovecsp = state.reg_parameter(
                t,
                2,
                ParamSize::fixed(Arch::SIZEOF_IOVEC.wrapping_mul(iovcnt)),
                In,
            );
            if !iovecsp.is_null() {
                let io_size = ParamSize::from_syscall_result(Arch::WORD_SIZE);
                for i in 0..iovcnt {
                    let iovp = iovecsp.byte_add(i * Arch::SIZEOF_IOVEC);
                    let iov_len = read_word_at(t, iovp.byte_add(Arch::IOVEC_IOV_LEN));
                    state.mem_ptr_parameter(
                        t,
                        iovp.byte_add(Arch::IOVEC_IOV_BASE),
                        io_size.limit_size(iov_len),
                        Out,
                    );
                }
            }
            state.done_preparing(t, AllowSwitch)
        }

        // pid_t waitpid(pid_t pid, int* status, int options)
        // pid_t wait4(pid_t pid, int* status, int options, struct rusage*
        //             rusage)
        Syscall::Waitpid | Syscall::Wait4 => {
            state.reg_parameter(t, 2, ParamSize::fixed(Arch::SIZEOF_INT), Out);
            if sysc == Syscall::Wait4 {
                state.reg_parameter(t, 4, ParamSize::fixed(Arch::SIZEOF_RUSAGE), Out);
            }
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Waitid => {
            state.reg_parameter(t, 3, ParamSize::fixed(Arch::SIZEOF_SIGINFO), Out);
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Pause => state.done_preparing(t, AllowSwitch),

        // int poll(struct pollfd* fds, nfds_t nfds, int timeout)
        // int ppoll(struct pollfd* fds, nfds_t nfds, const struct
        //           timespec* timeout_ts, const sigset_t* sigmask)
        Syscall::Poll | Syscall::Ppoll => {
            let nfds = t.regs().arg2();
            state.reg_parameter(
                t,
                1,
                ParamSize::fixed(Arch::SIZEOF_POLLFD.wrapping_mul(nfds)),
                InOut,
            );
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Prctl => {
            match t.regs().arg1_signed() as i32 {
                libc::PR_GET_ENDIAN
                | libc::PR_GET_FPEMU
                | libc::PR_GET_FPEXC
                | libc::PR_GET_PDEATHSIG
                | libc::PR_GET_TSC
                | libc::PR_GET_UNALIGN => {
                    state.reg_parameter(t, 2, ParamSize::fixed(Arch::SIZEOF_INT), Out);
                }

                libc::PR_GET_NAME => {
                    state.reg_parameter(t, 2, ParamSize::fixed(16), Out);
                }

                libc::PR_SET_NAME => {
                    let addr = RemotePtr::new(t.regs().arg2());
                    t.update_prname(addr);
                }

                libc::PR_SET_SECCOMP => {}

                _ => {
                    state.expect_errno = libc::EINVAL;
                }
            }
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Ioctl => {
            prepare_ioctl::<Arch>(t, state);
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Sysctl => {
            let argsp = state.reg_parameter(t, 1, ParamSize::fixed(Arch::SIZEOF_SYSCTL_ARGS), In);
            if !argsp.is_null() {
                let oldlenp = state.mem_ptr_parameter(
                    t,
                    argsp.byte_add(Arch::SYSCTL_OLDLENP),
                    ParamSize::fixed(Arch::WORD_SIZE),
                    InOut,
                );
                let oldval_size = ParamSize::from_initialized_mem(t, oldlenp, Arch::WORD_SIZE);
                state.mem_ptr_parameter(t, argsp.byte_add(Arch::SYSCTL_OLDVAL), oldval_size, Out);
            }
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::Quotactl => {
            match (t.regs().arg1_signed() >> SUBCMDSHIFT) as i32 {
                Q_GETQUOTA => {
                    state.reg_parameter(t, 4, ParamSize::fixed(Arch::SIZEOF_DQBLK), Out);
                }
                Q_GETINFO => {
                    state.reg_parameter(t, 4, ParamSize::fixed(Arch::SIZEOF_DQINFO), Out);
                }
                Q_GETFMT => {
                    state.reg_parameter(t, 4, ParamSize::fixed(Arch::SIZEOF_INT), Out);
                }
                Q_SETQUOTA => {
                    fatal!("Trying to set disk quota usage, this may interfere with recording");
                }
                Q_QUOTAON | Q_QUOTAOFF | Q_SETINFO | Q_SYNC => {}
                _ => {
                    state.expect_errno = libc::EINVAL;
                }
            }
            state.done_preparing(t, PreventSwitch)
        }

        // int epoll_wait(int epfd, struct epoll_event* events, int
        //                maxevents, int timeout)
        Syscall::EpollWait => {
            let maxevents = t.regs().arg3_signed().max(0) as usize;
            state.reg_parameter(
                t,
                2,
                ParamSize::fixed(Arch::SIZEOF_EPOLL_EVENT.wrapping_mul(maxevents)),
                Out,
            );
            state.done_preparing(t, AllowSwitch)
        }

        // The next two syscalls get switched not for liveness reasons but
        // because not switching would make the recorder busy-wait
        // needlessly; the tracee may also have carefully optimized its
        // own context switching and we should take the hint.

        // int nanosleep(const struct timespec* req, struct timespec* rem)
        Syscall::Nanosleep => {
            state.reg_parameter(t, 2, ParamSize::fixed(Arch::SIZEOF_TIMESPEC), Out);
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::SchedYield => {
            // Force `t` to be context-switched if another thread of equal
            // or higher priority is available. The counter is set to
            // INT_MAX/2 because irrelevant events between now and
            // scheduling may increment it and it must not overflow.
            t.set_succ_event_counter(i32::MAX as usize / 2);
            // We're just pretending that t is blocked. The next time its
            // scheduling slot opens up, it's OK to blocking-waitpid on it
            // to see its status change.
            t.set_pseudo_blocked(true);
            t.schedule_one_round_robin();
            AllowSwitch
        }

        Syscall::RtSigpending => {
            let set_size = t.regs().arg2();
            state.reg_parameter(t, 1, ParamSize::fixed(set_size), Out);
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::RtSigtimedwait => {
            state.reg_parameter(t, 2, ParamSize::fixed(Arch::SIZEOF_SIGINFO), Out);
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::RtSigsuspend | Syscall::Sigsuspend => {
            let setp = RemotePtr::<Void>::new(t.regs().arg1());
            if !setp.is_null() {
                let mask = read_unsigned(t, setp, 8);
                t.set_sigsuspend_blocked_sigs(Some(mask));
            }
            state.done_preparing(t, AllowSwitch)
        }

        Syscall::Getxattr | Syscall::Lgetxattr | Syscall::Fgetxattr => {
            let buf_size =
                ParamSize::from_syscall_result(Arch::WORD_SIZE).limit_size(t.regs().arg4());
            state.reg_parameter(t, 3, buf_size, Out);
            state.done_preparing(t, PreventSwitch)
        }

        Syscall::SchedSetaffinity => {
            state.syscall_entry_registers = Some(t.regs());
            // Ignore all sched_setaffinity syscalls: they might interfere
            // with our own affinity settings. Point arg1 at an invalid
            // pid so the kernel nullifies the call.
            let mut r = t.regs();
            r.set_arg1(usize::MAX);
            t.set_regs(&r);
            PreventSwitch
        }

        _ => PreventSwitch,
    }
}

/// Invoked when an interrupted syscall is about to be restarted.
pub fn rec_prepare_restart_syscall(t: &mut dyn Task) {
    let maybe_state = SYSCALL_STATES.lock().unwrap().remove(&t.tid());
    let mut state = match maybe_state {
        Some(state) => state,
        None => return,
    };

    if let Some(Syscall::Nanosleep) =
        crate::kernel_abi::syscall_from_raw(t.current_syscall(), t.arch())
    {
        // Hopefully uniquely among syscalls, nanosleep() requires writing
        // to its remaining-time outparam *only if* the syscall fails with
        // -EINTR. When a nanosleep() is interrupted by a signal, we don't
        // know a priori whether it's going to be eventually restarted or
        // not, so we don't know whether it will eventually return -EINTR
        // and need the outparam written. To resolve that, do what the
        // kernel does and update the outparam at the
        // -ERESTART_RESTARTBLOCK interruption regardless.
        state.process_syscall_results(t, WriteBack::WriteBack);
    }
}

const SCRATCH_NUM_PAGES: usize = 512;

/// Map the private scratch region into a (new) task and report the
/// mapping to the trace.
pub fn init_scratch_memory(t: &mut dyn Task) {
    let scratch_size = SCRATCH_NUM_PAGES * page_size();
    // The PROT_EXEC looks scary, and it is, but it's to prevent this
    // region from being coalesced with another anonymous segment mapped
    // just after this one. If we named this segment, we could remove this
    // hack.
    let prot = libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    let scratch_ptr = t.inject_mmap(RemotePtr::null(), scratch_size, prot, flags, -1, 0);
    t.set_scratch(scratch_ptr, scratch_size);

    // Record the mapping for replay, with the mmap result visible in the
    // result register.
    let mut r = t.regs();
    let saved_result = r.syscall_result();
    r.set_syscall_result(scratch_ptr.as_usize());
    t.set_regs(&r);

    let name = OsString::from(format!("scratch for thread {}", t.tid()));
    let file = TraceMappedRegion::new(
        name.clone(),
        0,
        0,
        scratch_ptr,
        scratch_ptr.byte_add(scratch_size),
        0,
    );
    let record = t.trace_writer().write_mapped_region(&file, prot, flags);
    ed_assert!(t, record == RecordInTrace::DontRecordInTrace);

    r.set_syscall_result(saved_result);
    t.set_regs(&r);

    t.map_region(scratch_ptr, scratch_size, prot, flags, 0, &name);
}

fn extract_clone_parameters<Arch: Architecture>(
    regs: &Registers,
) -> (RemotePtr<Void>, RemotePtr<Void>, RemotePtr<Void>) {
    (
        RemotePtr::new(regs.arg(Arch::CLONE_PARENT_TID_ARG)),
        RemotePtr::new(regs.arg(Arch::CLONE_TLS_ARG)),
        RemotePtr::new(regs.arg(Arch::CLONE_CHILD_TID_ARG)),
    )
}

fn process_clone<Arch: Architecture>(t: &mut dyn Task, state: &mut TaskSyscallState) {
    let flags = match &state.syscall_entry_registers {
        Some(entry) => entry.arg1(),
        None => t.regs().arg1(),
    };
    if flags & libc::CLONE_UNTRACED as usize != 0 {
        // Restore the UNTRACED bit we scrubbed at entry so the tracee
        // sees the value it asked for.
        let mut r = t.regs();
        r.set_arg1(flags);
        t.set_regs(&r);
    }

    let result = t.regs().syscall_result_signed();
    if result < 0 {
        return;
    }
    let new_tid = result as pid_t;

    // Record the tid/tls/ctid pointers as seen by the parent and by the
    // child; replay needs both copies of each, even when null.
    let parent_regs = t.regs();
    let (ptid_parent, tls_parent, _) = extract_clone_parameters::<Arch>(&parent_regs);
    t.record_remote_even_if_null(ptid_parent, Arch::SIZEOF_PID);
    if Arch::CLONE_TLS_TYPE == CloneTlsType::UserDescPointer {
        t.record_remote_even_if_null(tls_parent, Arch::SIZEOF_USER_DESC);
    }

    t.with_task(new_tid, &mut |new_task: &mut dyn Task| {
        let child_regs = new_task.regs();
        let (ptid_child, tls_child, ctid_child) = extract_clone_parameters::<Arch>(&child_regs);
        if Arch::CLONE_TLS_TYPE == CloneTlsType::UserDescPointer {
            new_task.record_remote_even_if_null(tls_child, Arch::SIZEOF_USER_DESC);
        }
        new_task.record_remote_even_if_null(ptid_child, Arch::SIZEOF_PID);
        new_task.record_remote_even_if_null(ctid_child, Arch::SIZEOF_PID);
    });

    let t_tid = t.tid();
    t.trace_writer()
        .write_task_event(&TraceTaskEvent::for_clone(new_tid, t_tid, flags));

    t.with_task(new_tid, &mut |new_task: &mut dyn Task| {
        init_scratch_memory(new_task);
        // The new tracee just "finished" a clone that was started by its
        // parent. It has no pending events, so it can be
        // context-switched out.
        new_task.set_switchable(AllowSwitch);
    });
}

fn process_execve<Arch: Architecture>(t: &mut dyn Task, state: &mut TaskSyscallState) {
    let mut r = t.regs();
    if r.syscall_failed() {
        if let Some(entry) = &state.syscall_entry_registers {
            if r.arg1() != entry.arg1() {
                log!(LogWarn, "Blocked attempt to execve an unsupported image");
                // Restore arg1, which we clobbered.
                r.set_arg1(entry.arg1());
                t.set_regs(&r);
            }
        }
        return;
    }

    // The kernel clears the argument registers across a successful exec;
    // anything else means this stop isn't the exec completion.
    if r.arg1() != 0 {
        return;
    }

    if let Some(event) = state.exec_saved_event.take() {
        t.trace_writer().write_task_event(&event);
    }

    t.post_exec_syscall();

    let word = Arch::WORD_SIZE;
    let mut stack_ptr = t.regs().sp();

    // The stack pointer points at argc. Skip argc and the argv pointers.
    let argc = read_word_at(t, stack_ptr);
    stack_ptr = stack_ptr.byte_add((argc + 1) * word);

    let null_ptr = read_word_at(t, stack_ptr);
    ed_assert!(t, null_ptr == 0);
    stack_ptr = stack_ptr.byte_add(word);

    // Skip the environment pointers.
    while read_word_at(t, stack_ptr) != 0 {
        stack_ptr = stack_ptr.byte_add(word);
    }
    stack_ptr = stack_ptr.byte_add(word);

    // Now at the ELF auxiliary vector. The kernel lays the keys down in a
    // fixed per-architecture order; a mismatch means our auxv model is
    // stale for this kernel.
    for (i, expected) in Arch::AUXV_ORDERING.iter().enumerate() {
        let key = read_word_at(t, stack_ptr) as u64;
        stack_ptr = stack_ptr.byte_add(2 * word);
        ed_assert!(
            t,
            key == *expected,
            "ELF aux entry {} should be {:#x}, but is {:#x}",
            i,
            expected,
            key
        );
    }

    let at_random = read_word_at(t, stack_ptr) as u64;
    ed_assert!(
        t,
        at_random == AT_RANDOM,
        "ELF item should be {:#x}, but is {:#x}",
        AT_RANDOM,
        at_random
    );
    stack_ptr = stack_ptr.byte_add(word);

    // AT_RANDOM points at 16 kernel-supplied random bytes; they are
    // nondeterministic and must be in the trace.
    let rand_addr = RemotePtr::new(read_word_at(t, stack_ptr));
    t.record_remote(rand_addr, 16);

    init_scratch_memory(t);
}

fn process_mmap(
    t: &mut dyn Task,
    length: usize,
    prot: i32,
    flags: i32,
    fd: i32,
    offset_pages: u64,
) {
    if t.regs().syscall_failed() {
        // We purely emulate failed mmaps.
        return;
    }

    let size = ceil_page_size(length);
    let offset = offset_pages * 4096;
    let addr = RemotePtr::<Void>::new(t.regs().syscall_result());
    if flags & libc::MAP_ANONYMOUS != 0 {
        // Anonymous mappings are by definition not backed by any file-like
        // object, and are initialized to zero, so there's no
        // nondeterminism to record.
        t.map_region(addr, size, prot, flags, 0, OsStr::new("<anonymous>"));
        return;
    }

    ed_assert!(t, fd >= 0, "Valid fd required for file mapping");
    ed_assert!(t, flags & libc::MAP_GROWSDOWN == 0);

    let st = t.stat_fd(fd);
    let file = TraceMappedRegion::new(
        st.file_name.clone(),
        st.device,
        st.inode,
        addr,
        addr.byte_add(size),
        offset_pages,
    );
    if t.trace_writer().write_mapped_region(&file, prot, flags) == RecordInTrace::RecordInTrace {
        let bytes_past_offset = st.file_size.saturating_sub(offset) as usize;
        t.record_remote(addr, min(bytes_past_offset, size));
    }

    if prot & libc::PROT_WRITE != 0 && flags & libc::MAP_SHARED != 0 {
        log!(
            LogDebug,
            "{:?} is SHARED|WRITEABLE; that's not handled correctly yet. Optimistically \
             hoping it's not written by programs outside this tracee tree.",
            st.file_name
        );
    }

    t.map_region(addr, size, prot, flags, offset, &st.file_name);
}

/// Task attributes that must be updated based on the finishing syscall,
/// before any result processing.
fn before_syscall_exit(t: &mut dyn Task, sysc: Option<Syscall>) {
    match sysc {
        Some(Syscall::Setpriority) => {
            // The syscall might have failed due to insufficient
            // permissions (e.g. while trying to decrease the nice value
            // while not root). We choose to honor the new value anyway,
            // which lets tests run a child thread at a lower nice value
            // than its parent.
            if t.regs().arg1_signed() as i32 == PRIO_PROCESS {
                let target = match t.regs().arg2_signed() as pid_t {
                    0 => t.tid(),
                    tid => tid,
                };
                log!(
                    LogDebug,
                    "Setting nice value for tid {} to {}",
                    target,
                    t.regs().arg3()
                );
                let priority = t.regs().arg3_signed() as i32;
                t.update_task_priority(target, priority);
            }
        }

        Some(Syscall::SetRobustList) => {
            let addr = RemotePtr::new(t.regs().arg1());
            let num_bytes = t.regs().arg2();
            t.set_robust_list(addr, num_bytes);
        }

        Some(Syscall::SetTidAddress) => {
            let addr = RemotePtr::new(t.regs().arg1());
            t.set_tid_addr(addr);
        }

        Some(Syscall::Sigaction) | Some(Syscall::RtSigaction) => {
            let r = t.regs();
            t.update_sigaction(&r);
        }

        Some(Syscall::Sigprocmask) | Some(Syscall::RtSigprocmask) => {
            let r = t.regs();
            t.update_sigmask(&r);
        }

        _ => {}
    }
}

fn check_syscall_rejected(t: &mut dyn Task) {
    // Invalid syscalls return -ENOSYS. Assume any such result means the
    // syscall was completely ignored by the kernel so it's OK for us to
    // not do anything special. Other results mean we probably need to
    // understand this syscall, but we don't.
    if t.regs().syscall_result_signed() != -(libc::ENOSYS as isize) {
        let syscallno = t.current_syscall();
        ed_assert!(
            t,
            false,
            "Unhandled syscall {}({}) returned {}",
            syscall_name(syscallno, t.arch()),
            syscallno,
            t.regs().syscall_result_signed()
        );
    }
}

/// Invoked at the syscall-exit stop: write results back from scratch,
/// restore registers and pointers, record output memory, and run the
/// syscall's post handlers.
pub fn rec_process_syscall(t: &mut dyn Task) {
    let maybe_state = SYSCALL_STATES.lock().unwrap().remove(&t.tid());
    let mut state = maybe_state.unwrap_or_default();
    let arch = t.arch();
    redo_arch_function!(rec_process_syscall_arch, arch, t, &mut state)
}

fn rec_process_syscall_arch<Arch: Architecture>(t: &mut dyn Task, state: &mut TaskSyscallState) {
    let syscallno = t.current_syscall();

    log!(
        LogDebug,
        "{}: processing: {}",
        t.tid(),
        syscall_name(syscallno, t.arch())
    );

    let maybe_sysc = Arch::from_raw_syscall(syscallno);
    before_syscall_exit(t, maybe_sysc);

    if let Some(rec) = t.desched_rec() {
        // The syscallbuf stood in for scratch; record its data so replay
        // can restore the outparams the same way.
        t.record_remote(rec.extra_data, rec.extra_size);
        return;
    }

    if syscallno < 0 {
        check_syscall_rejected(t);
        return;
    }

    if state.expect_errno != 0 {
        ed_assert!(
            t,
            t.regs().syscall_result_signed() == -(state.expect_errno as isize),
            "Expected {} for '{}' but got result {}",
            errno_name(state.expect_errno),
            syscall_name(syscallno, t.arch()),
            t.regs().syscall_result_signed()
        );
        return;
    }

    let sysc = match maybe_sysc {
        Some(sysc) => sysc,
        None => {
            check_syscall_rejected(t);
            return;
        }
    };

    match sysc {
        Syscall::Clone => process_clone::<Arch>(t, state),

        Syscall::Execve => process_execve::<Arch>(t, state),

        Syscall::Mmap => match Arch::MMAP_SEMANTICS {
            MmapCallingSemantics::StructArguments => {
                let argsp = RemotePtr::<Void>::new(t.regs().arg1());
                // struct mmap_arg_struct: addr, len, prot, flags, fd,
                // offset (bytes), all unsigned words.
                let mut args = [0usize; 6];
                for (i, arg) in args.iter_mut().enumerate() {
                    *arg = read_word_at(t, argsp.byte_add(i * Arch::WORD_SIZE));
                }
                process_mmap(
                    t,
                    args[1],
                    args[2] as i32,
                    args[3] as i32,
                    args[4] as i32,
                    (args[5] / 4096) as u64,
                );
            }
            MmapCallingSemantics::RegisterArguments => {
                let r = t.regs();
                process_mmap(
                    t,
                    r.arg2(),
                    r.arg3_signed() as i32,
                    r.arg4_signed() as i32,
                    r.arg5_signed() as i32,
                    (r.arg6_signed() / 4096) as u64,
                );
            }
        },

        Syscall::Mmap2 => {
            // mmap2's offset argument is already in pages.
            let r = t.regs();
            process_mmap(
                t,
                r.arg2(),
                r.arg3_signed() as i32,
                r.arg4_signed() as i32,
                r.arg5_signed() as i32,
                r.arg6() as u64,
            );
        }

        Syscall::Nanosleep => {
            // If the sleep completes, the kernel doesn't write back to the
            // remaining-time argument.
            let write_back = if t.regs().syscall_result_signed() == 0 {
                WriteBack::NoWriteBack
            } else {
                WriteBack::WriteBack
            };
            state.process_syscall_results(t, write_back);
        }

        Syscall::Open => {
            let pathname = t.read_c_str(RemotePtr::new(t.regs().arg1()));
            if is_blacklisted_filename(pathname.as_bytes()) {
                // The file is still open in the process's file table, but
                // the tracee can't use the result to reach it.
                log!(LogWarn, "Cowardly refusing to open {:?}", pathname);
                let mut r = t.regs();
                r.set_syscall_result_signed(-(libc::ENOENT as isize));
                t.set_regs(&r);
            }
        }

        Syscall::SchedSetaffinity => {
            // Restore the register we altered and pretend the syscall
            // succeeded.
            let mut r = t.regs();
            if let Some(entry) = &state.syscall_entry_registers {
                r.set_arg1(entry.arg1());
            }
            r.set_syscall_result(0);
            t.set_regs(&r);
        }

        Syscall::RtSigsuspend | Syscall::Sigsuspend => {
            t.set_sigsuspend_blocked_sigs(None);
        }

        Syscall::Write | Syscall::Writev => {}

        _ => {
            if state.preparation_done {
                state.process_syscall_results(t, WriteBack::WriteBack);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_abi::SupportedArch::X64;
    use crate::kernel_abi::X64Arch;
    use crate::kernel_supplement::FUTEX_PRIVATE_FLAG;
    use crate::task::{DeschedRecord, FdStat};
    use crate::trace::TraceWriter;
    use std::cell::RefCell;
    use std::convert::TryInto;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicI32, Ordering};

    static NEXT_TID: AtomicI32 = AtomicI32::new(1000);

    #[derive(Default)]
    struct MockTraceWriter {
        mapped: Vec<(OsString, i32, i32)>,
        task_events: Vec<TraceTaskEvent>,
        record_next: Option<RecordInTrace>,
    }

    impl TraceWriter for MockTraceWriter {
        fn write_mapped_region(
            &mut self,
            map: &TraceMappedRegion,
            prot: i32,
            flags: i32,
        ) -> RecordInTrace {
            self.mapped.push((map.file_name().to_os_string(), prot, flags));
            self.record_next
                .take()
                .unwrap_or(RecordInTrace::DontRecordInTrace)
        }

        fn write_task_event(&mut self, event: &TraceTaskEvent) {
            self.task_events.push(event.clone());
        }
    }

    struct MockTask {
        tid: pid_t,
        arch: SupportedArch,
        regs: Registers,
        mem: HashMap<usize, u8>,
        scratch_ptr: RemotePtr<Void>,
        scratch_size: usize,
        records: Vec<(usize, Vec<u8>)>,
        trace: MockTraceWriter,
        stdio_fds: Vec<i32>,
        cur_syscall: i32,
        desched: Option<DeschedRecord>,
        children: Vec<Rc<RefCell<MockTask>>>,
        round_robin: bool,
        pseudo_blocked: bool,
        succ_counter: usize,
        priorities: Vec<(pid_t, i32)>,
        switchable: Option<Switchable>,
        sigsuspend_mask: Option<u64>,
        mmap_bump: usize,
        mapped_regions: Vec<(usize, usize, i32, u64)>,
        fdstat: Option<FdStat>,
    }

    impl MockTask {
        fn new(arch: SupportedArch) -> MockTask {
            MockTask {
                tid: NEXT_TID.fetch_add(1, Ordering::Relaxed),
                arch,
                regs: Registers::new(arch),
                mem: HashMap::new(),
                scratch_ptr: RemotePtr::new(0x7000_0000),
                scratch_size: 512 * page_size(),
                records: Vec::new(),
                trace: MockTraceWriter::default(),
                stdio_fds: Vec::new(),
                cur_syscall: -1,
                desched: None,
                children: Vec::new(),
                round_robin: false,
                pseudo_blocked: false,
                succ_counter: 0,
                priorities: Vec::new(),
                switchable: None,
                sigsuspend_mask: None,
                mmap_bump: 0x2000_0000,
                mapped_regions: Vec::new(),
                fdstat: None,
            }
        }

        fn write_mem(&mut self, addr: usize, bytes: &[u8]) {
            for (i, b) in bytes.iter().enumerate() {
                self.mem.insert(addr + i, *b);
            }
        }

        fn read_mem(&self, addr: usize, n: usize) -> Vec<u8> {
            (0..n).map(|i| *self.mem.get(&(addr + i)).unwrap_or(&0)).collect()
        }

        fn write_word_mem(&mut self, addr: usize, val: u64) {
            match self.arch {
                SupportedArch::X86 => self.write_mem(addr, &(val as u32).to_le_bytes()),
                SupportedArch::X64 => self.write_mem(addr, &val.to_le_bytes()),
            }
        }

        fn write_u32_mem(&mut self, addr: usize, val: u32) {
            self.write_mem(addr, &val.to_le_bytes());
        }

        fn word_at(&self, addr: usize) -> u64 {
            u64::from_le_bytes(self.read_mem(addr, 8).try_into().unwrap())
        }

        fn u32_at(&self, addr: usize) -> u32 {
            u32::from_le_bytes(self.read_mem(addr, 4).try_into().unwrap())
        }

        fn enter_syscall(&mut self, no: i32, args: &[usize]) {
            self.cur_syscall = no;
            let mut r = Registers::new(self.arch);
            r.set_syscallno(no as isize);
            for (i, a) in args.iter().enumerate() {
                r.set_arg(i as i32 + 1, *a);
            }
            self.regs = r;
        }

        fn set_result(&mut self, result: isize) {
            let mut r = self.regs;
            r.set_syscall_result_signed(result);
            self.regs = r;
        }
    }

    impl Task for MockTask {
        fn tid(&self) -> pid_t {
            self.tid
        }
        fn arch(&self) -> SupportedArch {
            self.arch
        }
        fn current_syscall(&self) -> i32 {
            self.cur_syscall
        }
        fn regs(&self) -> Registers {
            self.regs
        }
        fn set_regs(&mut self, regs: &Registers) {
            self.regs = *regs;
        }

        fn read_bytes_helper(&mut self, addr: RemotePtr<Void>, buf: &mut [u8]) {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = *self.mem.get(&(addr.as_usize() + i)).unwrap_or(&0);
            }
        }

        fn write_bytes_helper(&mut self, addr: RemotePtr<Void>, buf: &[u8]) {
            for (i, b) in buf.iter().enumerate() {
                self.mem.insert(addr.as_usize() + i, *b);
            }
        }

        fn record_remote(&mut self, addr: RemotePtr<Void>, num_bytes: usize) {
            if addr.is_null() || num_bytes == 0 {
                return;
            }
            let data = self.read_mem(addr.as_usize(), num_bytes);
            self.records.push((addr.as_usize(), data));
        }

        fn record_remote_even_if_null(&mut self, addr: RemotePtr<Void>, num_bytes: usize) {
            if addr.is_null() {
                self.records.push((0, Vec::new()));
                return;
            }
            let data = self.read_mem(addr.as_usize(), num_bytes);
            self.records.push((addr.as_usize(), data));
        }

        fn record_local(&mut self, addr: RemotePtr<Void>, buf: &[u8]) {
            if addr.is_null() || buf.is_empty() {
                return;
            }
            self.records.push((addr.as_usize(), buf.to_vec()));
        }

        fn scratch_ptr(&self) -> RemotePtr<Void> {
            self.scratch_ptr
        }
        fn scratch_size(&self) -> usize {
            self.scratch_size
        }
        fn set_scratch(&mut self, ptr: RemotePtr<Void>, num_bytes: usize) {
            self.scratch_ptr = ptr;
            self.scratch_size = num_bytes;
        }

        fn desched_rec(&self) -> Option<DeschedRecord> {
            self.desched
        }

        fn trace_writer(&mut self) -> &mut dyn TraceWriter {
            &mut self.trace
        }

        fn inject_mmap(
            &mut self,
            _addr: RemotePtr<Void>,
            length: usize,
            _prot: i32,
            _flags: i32,
            _fd: i32,
            _offset: u64,
        ) -> RemotePtr<Void> {
            let p = self.mmap_bump;
            self.mmap_bump += ceil_page_size(length);
            RemotePtr::new(p)
        }

        fn with_task(&mut self, tid: pid_t, f: &mut dyn FnMut(&mut dyn Task)) {
            let maybe_child = self
                .children
                .iter()
                .find(|c| c.borrow().tid == tid)
                .cloned();
            if let Some(child) = maybe_child {
                f(&mut *child.borrow_mut());
            }
        }

        fn schedule_one_round_robin(&mut self) {
            self.round_robin = true;
        }
        fn set_pseudo_blocked(&mut self, blocked: bool) {
            self.pseudo_blocked = blocked;
        }
        fn set_succ_event_counter(&mut self, count: usize) {
            self.succ_counter = count;
        }
        fn update_task_priority(&mut self, tid: pid_t, priority: i32) {
            self.priorities.push((tid, priority));
        }
        fn set_switchable(&mut self, switchable: Switchable) {
            self.switchable = Some(switchable);
        }

        fn set_sigsuspend_blocked_sigs(&mut self, mask: Option<u64>) {
            self.sigsuspend_mask = mask;
        }

        fn stat_fd(&mut self, _fd: i32) -> FdStat {
            self.fdstat.clone().expect("stat_fd not configured")
        }

        fn map_region(
            &mut self,
            addr: RemotePtr<Void>,
            num_bytes: usize,
            prot: i32,
            _flags: i32,
            offset_bytes: u64,
            _name: &OsStr,
        ) {
            self.mapped_regions
                .push((addr.as_usize(), num_bytes, prot, offset_bytes));
        }

        fn is_recorder_stdio_fd(&self, fd: i32) -> bool {
            self.stdio_fds.contains(&fd)
        }
    }

    #[test]
    fn param_size_distribution_and_limits() {
        let mut t = MockTask::new(X64);

        let a = ParamSize::from_syscall_result(8).limit_size(4);
        let b = ParamSize::from_syscall_result(8).limit_size(8);
        assert!(a.is_same_source(&b));
        assert!(!a.is_same_source(&ParamSize::fixed(4)));
        assert!(!a.is_same_source(&ParamSize::from_syscall_result(4)));

        t.set_result(10);
        assert_eq!(4, a.eval(&mut t, 0));
        assert_eq!(6, b.eval(&mut t, 4));

        // Failed syscalls contribute a zero dynamic size.
        t.set_result(-(libc::EIO as isize));
        assert_eq!(0, a.eval(&mut t, 0));

        let m1 = ParamSize::from_mem(RemotePtr::new(0x100), 4);
        let m2 = ParamSize::from_mem(RemotePtr::new(0x100), 4);
        let m3 = ParamSize::from_mem(RemotePtr::new(0x104), 4);
        assert!(m1.is_same_source(&m2));
        assert!(!m1.is_same_source(&m3));

        t.write_u32_mem(0x100, 10);
        assert_eq!(6, m1.eval(&mut t, 4));

        t.write_u32_mem(0x200, 16);
        let init = ParamSize::from_initialized_mem(&mut t, RemotePtr::new(0x200), 4);
        assert_eq!(16, init.max_size);
        t.write_u32_mem(0x200, 12);
        assert_eq!(12, init.eval(&mut t, 0));
    }

    #[test]
    fn scratch_allocations_are_aligned_and_disjoint() {
        let mut t = MockTask::new(X64);
        t.enter_syscall(0, &[0x1000, 0x2000]);
        let mut state = TaskSyscallState::default();
        state.init(&t);

        state.reg_parameter(&mut t, 1, ParamSize::fixed(3), Out);
        state.reg_parameter(&mut t, 2, ParamSize::fixed(9), Out);

        let base = t.scratch_ptr.as_usize();
        assert_eq!(base, state.param_list[0].scratch.as_usize());
        assert_eq!(base + 8, state.param_list[1].scratch.as_usize());
        assert_eq!(base + 24, state.scratch.as_usize());
    }

    // Seed scenario 1: read(fd=5, buf=0x1000, count=16), kernel returns 10.
    #[test]
    fn read_stages_scratch_and_records_output() {
        let mut t = MockTask::new(X64);
        t.enter_syscall(0, &[5, 0x1000, 16]);

        let sw = rec_prepare_syscall(&mut t);
        assert_eq!(AllowSwitch, sw);
        let scratch = t.scratch_ptr.as_usize();
        assert_eq!(scratch, t.regs.arg2());

        t.write_mem(scratch, b"HELLO\0WORL");
        t.set_result(10);
        rec_process_syscall(&mut t);

        assert_eq!(0x1000, t.regs.arg2());
        assert_eq!(b"HELLO\0WORL".to_vec(), t.read_mem(0x1000, 10));
        assert_eq!(vec![(0x1000, b"HELLO\0WORL".to_vec())], t.records);
    }

    // Seed scenario 2: readv with iov = [{0x2000,4},{0x3000,8}], kernel
    // returns 10: 4 bytes land in the first buffer, 6 in the second.
    #[test]
    fn readv_distributes_result_across_iovecs() {
        let mut t = MockTask::new(X64);
        t.write_word_mem(0x5000, 0x2000);
        t.write_word_mem(0x5008, 4);
        t.write_word_mem(0x5010, 0x3000);
        t.write_word_mem(0x5018, 8);
        t.enter_syscall(19, &[5, 0x5000, 2]);

        let sw = rec_prepare_syscall(&mut t);
        assert_eq!(AllowSwitch, sw);
        let scratch = t.scratch_ptr.as_usize();
        assert_eq!(scratch, t.regs.arg2());
        // The staged iovec array must point into scratch.
        assert_eq!(scratch + 32, t.word_at(scratch) as usize);
        assert_eq!(scratch + 40, t.word_at(scratch + 16) as usize);

        t.write_mem(scratch + 32, b"ABCD");
        t.write_mem(scratch + 40, b"EFGHIJ");
        t.set_result(10);
        rec_process_syscall(&mut t);

        assert_eq!(0x5000, t.regs.arg2());
        assert_eq!(b"ABCD".to_vec(), t.read_mem(0x2000, 4));
        assert_eq!(b"EFGHIJ".to_vec(), t.read_mem(0x3000, 6));
        // The iovec array itself is restored.
        assert_eq!(0x2000, t.word_at(0x5000) as usize);
        assert_eq!(0x3000, t.word_at(0x5010) as usize);
        assert_eq!(
            vec![
                (0x2000, b"ABCD".to_vec()),
                (0x3000, b"EFGHIJ".to_vec())
            ],
            t.records
        );
    }

    // Seed scenario 3: recvmsg with name, two iovecs and control data.
    #[test]
    fn recvmsg_stages_and_restores_indirect_buffers() {
        let mut t = MockTask::new(X64);
        // msghdr at 0x6000
        t.write_word_mem(0x6000, 0x7000); // msg_name
        t.write_u32_mem(0x6008, 16); // msg_namelen
        t.write_word_mem(0x6010, 0x8000); // msg_iov
        t.write_word_mem(0x6018, 2); // msg_iovlen
        t.write_word_mem(0x6020, 0xb000); // msg_control
        t.write_word_mem(0x6028, 32); // msg_controllen
        // iovecs at 0x8000
        t.write_word_mem(0x8000, 0x9000);
        t.write_word_mem(0x8008, 4);
        t.write_word_mem(0x8010, 0xa000);
        t.write_word_mem(0x8018, 8);
        t.enter_syscall(47, &[3, 0x6000, 0]);

        let sw = rec_prepare_syscall(&mut t);
        assert_eq!(AllowSwitch, sw);
        let s = t.scratch_ptr.as_usize();
        assert_eq!(s, t.regs.arg2());

        // Kernel writes into the scratch copies: name len 12, control len
        // 20, 7 payload bytes split 4/3 across the iov buffers.
        t.write_u32_mem(s + 8, 12);
        t.write_word_mem(s + 40, 20);
        t.write_mem(s + 56, b"AF_UNIX_SOCK");
        t.write_mem(s + 104, b"ABCD");
        t.write_mem(s + 112, b"EFG");
        t.write_mem(s + 120, &[0xcc; 20]);
        t.set_result(7);
        rec_process_syscall(&mut t);

        assert_eq!(0x6000, t.regs.arg2());
        // Payload written back to the original buffers.
        assert_eq!(b"AF_UNIX_SOCK".to_vec(), t.read_mem(0x7000, 12));
        assert_eq!(b"ABCD".to_vec(), t.read_mem(0x9000, 4));
        assert_eq!(b"EFG".to_vec(), t.read_mem(0xa000, 3));
        assert_eq!(vec![0xcc; 20], t.read_mem(0xb000, 20));
        // Pointer fields restored to tracee addresses, kernel-updated
        // lengths preserved.
        assert_eq!(0x7000, t.word_at(0x6000) as usize);
        assert_eq!(12, t.u32_at(0x6008));
        assert_eq!(0x8000, t.word_at(0x6010) as usize);
        assert_eq!(0xb000, t.word_at(0x6020) as usize);
        assert_eq!(20, t.word_at(0x6028));
        assert_eq!(0x9000, t.word_at(0x8000) as usize);
        assert_eq!(0xa000, t.word_at(0x8010) as usize);

        // Records in registration order: msghdr, name, iov payloads,
        // control. The iovec array itself is an in-parameter and is not
        // recorded.
        assert_eq!(5, t.records.len());
        assert_eq!((0x6000, 56), (t.records[0].0, t.records[0].1.len()));
        assert_eq!((0x7000, b"AF_UNIX_SOCK".to_vec()), t.records[1].clone());
        assert_eq!((0x9000, b"ABCD".to_vec()), t.records[2].clone());
        assert_eq!((0xa000, b"EFG".to_vec()), t.records[3].clone());
        assert_eq!((0xb000, vec![0xcc; 20]), t.records[4].clone());
        // The recorded msghdr carries the restored pointers.
        let rec = &t.records[0].1;
        assert_eq!(0x7000, u64::from_le_bytes(rec[0..8].try_into().unwrap()));
        assert_eq!(0x8000, u64::from_le_bytes(rec[16..24].try_into().unwrap()));
    }

    // Seed scenario 4: futex(FUTEX_WAIT) must not be relocated.
    #[test]
    fn futex_wait_uses_no_scratch_and_allows_switch() {
        let mut t = MockTask::new(X64);
        t.write_u32_mem(0x4000, 1);
        t.enter_syscall(202, &[0x4000, (FUTEX_WAIT | FUTEX_PRIVATE_FLAG) as usize, 1, 0]);

        let sw = rec_prepare_syscall(&mut t);
        assert_eq!(AllowSwitch, sw);
        // The futex word's identity is its address: no relocation.
        assert_eq!(0x4000, t.regs.arg1());

        t.set_result(0);
        rec_process_syscall(&mut t);
        assert_eq!(vec![(0x4000, vec![1, 0, 0, 0])], t.records);
    }

    // Seed scenario 5: writes to the recorder's own stdio must not be
    // interruptible; other writes may be.
    #[test]
    fn write_switchability_depends_on_stdio_identity() {
        let mut t = MockTask::new(X64);
        t.stdio_fds = vec![1];
        t.enter_syscall(1, &[1, 0x1000, 100]);
        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));
        t.set_result(100);
        rec_process_syscall(&mut t);
        assert!(t.records.is_empty());

        t.stdio_fds.clear();
        t.enter_syscall(1, &[1, 0x1000, 100]);
        assert_eq!(AllowSwitch, rec_prepare_syscall(&mut t));
        t.set_result(100);
        rec_process_syscall(&mut t);
        assert!(t.records.is_empty());
    }

    // Seed scenario 6: clone with CLONE_UNTRACED: scrubbed at entry,
    // restored at exit, child records + scratch + task event emitted.
    #[test]
    fn clone_untraced_is_scrubbed_and_child_initialized() {
        let mut t = MockTask::new(X64);
        let child = Rc::new(RefCell::new(MockTask::new(X64)));
        let child_tid = child.borrow().tid;
        t.children.push(child.clone());

        let flags = (libc::CLONE_UNTRACED | libc::CLONE_VM) as usize;
        t.enter_syscall(56, &[flags, 0, 0xc000, 0xc100, 0]);

        let sw = rec_prepare_syscall(&mut t);
        assert_eq!(PreventSwitch, sw);
        assert_eq!(flags & !(libc::CLONE_UNTRACED as usize), t.regs.arg1());

        {
            let mut c = child.borrow_mut();
            let mut r = Registers::new(X64);
            r.set_arg1(flags);
            r.set_arg3(0xd000);
            r.set_arg4(0xd100);
            c.regs = r;
        }
        t.set_result(child_tid as isize);
        rec_process_syscall(&mut t);

        // Original flags visible to the tracee again.
        assert_eq!(flags, t.regs.arg1());
        // Parent's copy of the parent_tid pointer.
        assert_eq!(vec![(0xc000, vec![0; 4])], t.records);

        let c = child.borrow();
        // Child's parent_tid and child_tid copies (x86-64 passes tls as a
        // raw pointer, so no user_desc record).
        assert_eq!(
            vec![(0xd000, vec![0; 4]), (0xd100, vec![0; 4])],
            c.records
        );
        assert_eq!(512 * page_size(), c.scratch_size);
        assert_eq!(0x2000_0000, c.scratch_ptr.as_usize());
        assert_eq!(Some(AllowSwitch), c.switchable);
        assert_eq!(1, c.trace.mapped.len());

        assert_eq!(1, t.trace.task_events.len());
        match &t.trace.task_events[0] {
            TraceTaskEvent::Clone(ev) => {
                assert_eq!(child_tid, ev.tid());
                assert_eq!(t.tid, ev.parent_tid());
                assert_eq!(flags, ev.clone_flags());
            }
            _ => panic!("expected a clone event"),
        }
    }

    #[test]
    fn nanosleep_success_skips_write_back_but_restores_registers() {
        let mut t = MockTask::new(X64);
        t.write_mem(0x3100, &[0xaa; 16]);
        t.enter_syscall(35, &[0x3000, 0x3100]);

        assert_eq!(AllowSwitch, rec_prepare_syscall(&mut t));
        let s = t.scratch_ptr.as_usize();
        assert_eq!(s, t.regs.arg2());

        // Sleep completed: the kernel wrote nothing.
        t.set_result(0);
        rec_process_syscall(&mut t);

        assert_eq!(0x3100, t.regs.arg2());
        assert_eq!(vec![0xaa; 16], t.read_mem(0x3100, 16));
        assert!(t.records.is_empty());
    }

    #[test]
    fn interrupted_nanosleep_writes_back_remaining_time() {
        let mut t = MockTask::new(X64);
        t.enter_syscall(35, &[0x3000, 0x3100]);
        assert_eq!(AllowSwitch, rec_prepare_syscall(&mut t));
        let s = t.scratch_ptr.as_usize();

        t.write_mem(s, &[0x11; 16]);
        t.set_result(-(libc::EINTR as isize));
        rec_process_syscall(&mut t);

        assert_eq!(0x3100, t.regs.arg2());
        assert_eq!(vec![0x11; 16], t.read_mem(0x3100, 16));
        assert_eq!(vec![(0x3100, vec![0x11; 16])], t.records);
    }

    #[test]
    fn nanosleep_restart_forces_write_back() {
        let mut t = MockTask::new(X64);
        t.enter_syscall(35, &[0x3000, 0x3100]);
        assert_eq!(AllowSwitch, rec_prepare_syscall(&mut t));
        let s = t.scratch_ptr.as_usize();

        // Interrupted by a signal; the kernel updated the remaining time
        // at the restart interruption.
        t.write_mem(s, &[0x22; 16]);
        t.set_result(-(crate::kernel_supplement::ERESTART_RESTARTBLOCK as isize));
        rec_prepare_restart_syscall(&mut t);

        assert_eq!(0x3100, t.regs.arg2());
        assert_eq!(vec![(0x3100, vec![0x22; 16])], t.records);
    }

    #[test]
    fn getsockopt_length_word_governs_capture() {
        let mut t = MockTask::new(X64);
        t.write_u32_mem(0xd100, 8);
        t.enter_syscall(55, &[3, 1, 2, 0xd000, 0xd100]);

        // Deterministic call: no scratch, no switching.
        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));
        assert_eq!(0xd000, t.regs.arg4());

        // Kernel writes straight to the tracee.
        t.write_u32_mem(0xd100, 6);
        t.write_mem(0xd000, b"OPTVAL");
        t.set_result(0);
        rec_process_syscall(&mut t);

        assert_eq!(
            vec![
                (0xd100, vec![6, 0, 0, 0]),
                (0xd000, b"OPTVAL".to_vec())
            ],
            t.records
        );
    }

    #[test]
    fn ioctl_tcgets_records_kernel_termios() {
        let mut t = MockTask::new(X64);
        t.enter_syscall(16, &[0, TCGETS as usize, 0xe000]);
        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));

        t.write_mem(0xe000, &[0x5a; 36]);
        t.set_result(0);
        rec_process_syscall(&mut t);
        assert_eq!(vec![(0xe000, vec![0x5a; 36])], t.records);
    }

    #[test]
    fn unknown_read_ioctl_downgrades_to_declared_size() {
        let mut t = MockTask::new(X64);
        // _IOR('a', 3, 24)
        let request: usize = (2 << 30) | (24 << 16) | (0x61 << 8) | 3;
        t.enter_syscall(16, &[0, request, 0xe100]);
        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));

        t.write_mem(0xe100, &[0x7f; 24]);
        t.set_result(0);
        rec_process_syscall(&mut t);
        assert_eq!(vec![(0xe100, vec![0x7f; 24])], t.records);
    }

    #[test]
    fn sched_setaffinity_is_nullified_and_forced_to_succeed() {
        let mut t = MockTask::new(X64);
        t.enter_syscall(203, &[1234, 8, 0x9000]);

        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));
        assert_eq!(usize::MAX, t.regs.arg1());

        t.set_result(-(libc::ESRCH as isize));
        rec_process_syscall(&mut t);
        assert_eq!(1234, t.regs.arg1());
        assert_eq!(0, t.regs.syscall_result());
    }

    #[test]
    fn sched_yield_marks_pseudo_blocked_and_round_robins() {
        let mut t = MockTask::new(X64);
        t.enter_syscall(24, &[]);
        assert_eq!(AllowSwitch, rec_prepare_syscall(&mut t));
        assert!(t.pseudo_blocked);
        assert!(t.round_robin);
        assert_eq!(i32::MAX as usize / 2, t.succ_counter);

        t.set_result(0);
        rec_process_syscall(&mut t);
        assert!(t.records.is_empty());
    }

    #[test]
    fn setpriority_updates_scheduler_even_on_failure() {
        let mut t = MockTask::new(X64);
        t.enter_syscall(141, &[PRIO_PROCESS as usize, 0, 15]);
        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));
        t.set_result(-(libc::EACCES as isize));
        rec_process_syscall(&mut t);
        let tid = t.tid;
        assert_eq!(vec![(tid, 15)], t.priorities);
    }

    #[test]
    fn magic_save_data_fd_is_recorded_at_entry() {
        let mut t = MockTask::new(X64);
        t.write_mem(0xf000, b"HELLO");
        t.enter_syscall(1, &[REDO_MAGIC_SAVE_DATA_FD as usize, 0xf000, 5]);
        rec_before_record_syscall_entry(&mut t, 1);
        assert_eq!(vec![(0xf000, b"HELLO".to_vec())], t.records);

        // Ordinary fds are not intercepted.
        t.records.clear();
        t.enter_syscall(1, &[7, 0xf000, 5]);
        rec_before_record_syscall_entry(&mut t, 1);
        assert!(t.records.is_empty());
    }

    #[test]
    fn scratch_overflow_downgrades_to_prevent_switch() {
        let mut t = MockTask::new(X64);
        t.scratch_size = 16;
        t.enter_syscall(0, &[5, 0x1000, 64]);

        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));
        // No relocation happened.
        assert_eq!(0x1000, t.regs.arg2());

        // The kernel wrote straight to the original buffer.
        t.write_mem(0x1000, b"0123456789");
        t.set_result(10);
        rec_process_syscall(&mut t);
        assert_eq!(vec![(0x1000, b"0123456789".to_vec())], t.records);
    }

    #[test]
    fn done_preparing_is_idempotent_across_reentry() {
        let mut t = MockTask::new(X64);
        t.enter_syscall(0, &[5, 0x1000, 16]);

        assert_eq!(AllowSwitch, rec_prepare_syscall(&mut t));
        let redirected = t.regs.arg2();
        // The syscall got interrupted and re-entered: preparation must not
        // run twice.
        assert_eq!(AllowSwitch, rec_prepare_syscall(&mut t));
        assert_eq!(redirected, t.regs.arg2());

        let s = t.scratch_ptr.as_usize();
        t.write_mem(s, b"XY");
        t.set_result(2);
        rec_process_syscall(&mut t);
        assert_eq!(vec![(0x1000, b"XY".to_vec())], t.records);
    }

    #[test]
    fn expected_einval_passes_quietly() {
        let mut t = MockTask::new(X64);
        // fcntl with a command the recorder doesn't know.
        t.enter_syscall(72, &[3, 0x7777, 0]);
        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));
        t.set_result(-(libc::EINVAL as isize));
        rec_process_syscall(&mut t);
        assert!(t.records.is_empty());
    }

    #[test]
    fn execve_walks_auxv_and_records_at_random() {
        let mut t = MockTask::new(X64);
        t.write_mem(0x100, b"/bin/true\0");
        t.write_word_mem(0x200, 0x300);
        t.write_word_mem(0x208, 0);
        t.write_mem(0x300, b"true\0");
        t.enter_syscall(59, &[0x100, 0x200, 0x400]);

        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));

        // Build the post-exec stack: argc, argv, envp, auxv, AT_RANDOM.
        let base = 0x50000usize;
        t.write_word_mem(base, 1);
        t.write_word_mem(base + 8, 0x300);
        t.write_word_mem(base + 16, 0);
        t.write_word_mem(base + 24, 0x400);
        t.write_word_mem(base + 32, 0);
        let mut p = base + 40;
        for (i, key) in X64Arch::AUXV_ORDERING.iter().enumerate() {
            t.write_word_mem(p, *key);
            t.write_word_mem(p + 8, 0x1000 + i as u64);
            p += 16;
        }
        t.write_word_mem(p, AT_RANDOM);
        t.write_word_mem(p + 8, 0x60000);
        t.write_mem(0x60000, &[0xab; 16]);

        let mut r = Registers::new(X64);
        r.set_syscall_result(0);
        r.set_sp(RemotePtr::new(base));
        t.regs = r;
        rec_process_syscall(&mut t);

        assert_eq!(1, t.trace.task_events.len());
        match &t.trace.task_events[0] {
            TraceTaskEvent::Exec(ev) => {
                assert_eq!(OsStr::new("/bin/true"), ev.file_name());
                assert_eq!(vec![OsString::from("true")], ev.cmd_line().to_vec());
            }
            _ => panic!("expected an exec event"),
        }
        assert_eq!(vec![(0x60000, vec![0xab; 16])], t.records);
        // Fresh scratch for the new address space.
        assert_eq!(0x2000_0000, t.scratch_ptr.as_usize());
        assert_eq!(1, t.trace.mapped.len());
    }

    #[test]
    fn anonymous_mmap_is_tracked_but_not_recorded() {
        let mut t = MockTask::new(X64);
        let flags = (libc::MAP_PRIVATE | libc::MAP_ANONYMOUS) as usize;
        t.enter_syscall(9, &[0, 0x2000, libc::PROT_READ as usize, flags, -1isize as usize, 0]);
        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));
        t.set_result(0x3000_0000);
        rec_process_syscall(&mut t);

        assert!(t.records.is_empty());
        assert!(t.trace.mapped.is_empty());
        assert_eq!(vec![(0x3000_0000, 0x2000, libc::PROT_READ, 0)], t.mapped_regions);
    }

    #[test]
    fn file_mmap_records_contents_when_trace_writer_asks() {
        let mut t = MockTask::new(X64);
        t.fdstat = Some(FdStat {
            file_name: OsString::from("/lib/foo.so"),
            device: 8,
            inode: 42,
            file_size: 10000,
        });
        t.trace.record_next = Some(RecordInTrace::RecordInTrace);
        t.write_mem(0x4000_0000, &[0x11; 4096]);

        t.enter_syscall(
            9,
            &[0, 0x1000, libc::PROT_READ as usize, libc::MAP_PRIVATE as usize, 3, 8192],
        );
        assert_eq!(PreventSwitch, rec_prepare_syscall(&mut t));
        t.set_result(0x4000_0000);
        rec_process_syscall(&mut t);

        // min(file_size - offset, length) = min(10000 - 8192, 4096) = 1808.
        assert_eq!(1, t.records.len());
        assert_eq!((0x4000_0000, 1808), (t.records[0].0, t.records[0].1.len()));
        assert_eq!(1, t.trace.mapped.len());
        assert_eq!(vec![(0x4000_0000, 4096, libc::PROT_READ, 8192)], t.mapped_regions);
    }

    #[test]
    fn desched_record_bypasses_scratch() {
        let mut t = MockTask::new(X64);
        t.desched = Some(DeschedRecord {
            syscallno: 0,
            extra_data: RemotePtr::new(0x8800),
            extra_size: 6,
        });
        t.write_mem(0x8800, b"BUFFED");
        t.enter_syscall(0, &[5, 0x1000, 16]);

        assert_eq!(AllowSwitch, rec_prepare_syscall(&mut t));
        // No argument redirection happened: the syscallbuf is the scratch.
        assert_eq!(0x1000, t.regs.arg2());

        t.set_result(6);
        rec_process_syscall(&mut t);
        assert_eq!(vec![(0x8800, b"BUFFED".to_vec())], t.records);
    }

    #[test]
    fn sigsuspend_shadows_and_clears_the_blocked_mask() {
        let mut t = MockTask::new(X64);
        t.write_mem(0x9100, &0x0000_0000_0001_4002u64.to_le_bytes());
        t.enter_syscall(130, &[0x9100, 8]);

        assert_eq!(AllowSwitch, rec_prepare_syscall(&mut t));
        assert_eq!(Some(0x14002), t.sigsuspend_mask);

        t.set_result(-(libc::EINTR as isize));
        rec_process_syscall(&mut t);
        assert_eq!(None, t.sigsuspend_mask);
    }
}
