/// During recording, sometimes we need to ensure that an iteration of the
/// record loop schedules the same task as the previous iteration. The
/// PreventSwitch value indicates that this is required. For example, the
/// futex operation FUTEX_WAKE_OP modifies userspace memory; those changes
/// are only recorded after the system call completes; and they must be
/// replayed before we allow a context switch to a woken-up task (because
/// the kernel guarantees those effects are seen by woken-up tasks).
/// Entering a potentially blocking system call must use AllowSwitch, or
/// we risk deadlock. Most non-blocking system calls could use PreventSwitch
/// or AllowSwitch; for simplicity we use AllowSwitch to indicate a call
/// could block and PreventSwitch otherwise.
/// Note that even if a system call uses PreventSwitch, as soon as we've
/// recorded the completion of the system call, we can switch to another
/// task.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Switchable {
    PreventSwitch,
    AllowSwitch,
}
