//! The contract between the syscall handlers and the external trace
//! persistence layer. The handlers only ever append: raw memory records go
//! through `Task::record_*`, mapped-region and task-lifecycle records come
//! through the `TraceWriter` trait defined here.

use crate::remote_ptr::{RemotePtr, Void};
use libc::pid_t;
use std::ffi::{OsStr, OsString};

/// Answer from the trace writer when a new file mapping is reported:
/// should the mapping's current contents be captured into the trace, or
/// can replay reproduce them some other way (e.g. from a previously
/// captured copy of the same file)?
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RecordInTrace {
    DontRecordInTrace,
    RecordInTrace,
}

/// A region of tracee memory backed by a (possibly synthetic) file, as
/// reported to the trace writer when the tracee maps it.
#[derive(Clone, Debug)]
pub struct TraceMappedRegion {
    file_name: OsString,
    device: u64,
    inode: u64,
    start: RemotePtr<Void>,
    end: RemotePtr<Void>,
    offset_pages: u64,
}

impl TraceMappedRegion {
    pub fn new(
        file_name: OsString,
        device: u64,
        inode: u64,
        start: RemotePtr<Void>,
        end: RemotePtr<Void>,
        offset_pages: u64,
    ) -> TraceMappedRegion {
        TraceMappedRegion {
            file_name,
            device,
            inode,
            start,
            end,
            offset_pages,
        }
    }

    pub fn file_name(&self) -> &OsStr {
        &self.file_name
    }
    pub fn device(&self) -> u64 {
        self.device
    }
    pub fn inode(&self) -> u64 {
        self.inode
    }
    pub fn start(&self) -> RemotePtr<Void> {
        self.start
    }
    pub fn end(&self) -> RemotePtr<Void> {
        self.end
    }
    pub fn offset_pages(&self) -> u64 {
        self.offset_pages
    }
}

/// Task lifecycle events the replayer needs to rebuild the task tree.
#[derive(Clone, Debug)]
pub enum TraceTaskEvent {
    Clone(TraceTaskEventClone),
    Exec(TraceTaskEventExec),
}

#[derive(Clone, Debug)]
pub struct TraceTaskEventClone {
    tid_: pid_t,
    parent_tid_: pid_t,
    clone_flags_: usize,
}

#[derive(Clone, Debug)]
pub struct TraceTaskEventExec {
    tid_: pid_t,
    file_name_: OsString,
    cmd_line_: Vec<OsString>,
}

impl TraceTaskEvent {
    pub fn for_clone(tid: pid_t, parent_tid: pid_t, clone_flags: usize) -> TraceTaskEvent {
        TraceTaskEvent::Clone(TraceTaskEventClone {
            tid_: tid,
            parent_tid_: parent_tid,
            clone_flags_: clone_flags,
        })
    }

    pub fn for_exec(tid: pid_t, file_name: OsString, cmd_line: Vec<OsString>) -> TraceTaskEvent {
        TraceTaskEvent::Exec(TraceTaskEventExec {
            tid_: tid,
            file_name_: file_name,
            cmd_line_: cmd_line,
        })
    }
}

impl TraceTaskEventClone {
    pub fn tid(&self) -> pid_t {
        self.tid_
    }
    pub fn parent_tid(&self) -> pid_t {
        self.parent_tid_
    }
    pub fn clone_flags(&self) -> usize {
        self.clone_flags_
    }
}

impl TraceTaskEventExec {
    pub fn tid(&self) -> pid_t {
        self.tid_
    }
    pub fn file_name(&self) -> &OsStr {
        &self.file_name_
    }
    pub fn cmd_line(&self) -> &[OsString] {
        &self.cmd_line_
    }
}

/// Implemented by the external trace persistence layer.
pub trait TraceWriter {
    /// A new file mapping appeared in a tracee. The writer decides whether
    /// the contents must be captured (it deduplicates against file copies
    /// it already holds).
    fn write_mapped_region(
        &mut self,
        map: &TraceMappedRegion,
        prot: i32,
        flags: i32,
    ) -> RecordInTrace;

    /// Append a task lifecycle event.
    fn write_task_event(&mut self, event: &TraceTaskEvent);
}
