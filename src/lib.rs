//! Record-mode syscall handling for a deterministic record/replay debugger.
//!
//! During recording every syscall a tracee executes is observed twice: once
//! at syscall entry, where we decide whether the tracee may be descheduled
//! while the syscall blocks (and stage its memory parameters into private
//! scratch so concurrent tracees cannot observe intermediate kernel writes),
//! and once at syscall exit, where kernel-produced side effects are copied
//! back to their original locations and appended to the trace so replay can
//! reproduce them without re-executing the kernel.
//!
//! The ptrace driver, the scheduler, trace persistence and task lifetime
//! management are external collaborators: they implement the [`task::Task`]
//! and [`trace::TraceWriter`] traits and call into
//! [`record_syscall::rec_prepare_syscall`],
//! [`record_syscall::rec_prepare_restart_syscall`] and
//! [`record_syscall::rec_process_syscall`] from their syscall-stop handlers.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate static_assertions;

#[macro_use]
pub mod log;
#[macro_use]
pub mod kernel_abi;

pub mod event;
pub mod kernel_metadata;
pub mod kernel_supplement;
pub mod record_syscall;
pub mod redo;
pub mod registers;
pub mod remote_ptr;
pub mod task;
pub mod trace;
pub mod util;
