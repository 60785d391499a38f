/// Tracees can write data to this special fd that they want verified across
/// record/replay. When it's written during recording, redo saves the data.
/// During replay, the data are checked against the recorded data.
///
/// Tracees using this interface should take care that the buffers storing
/// the data are either not racy, or are synchronized by the tracee.
///
/// To simplify things, this is a valid fd opened to /dev/null during
/// recording.
pub const REDO_MAGIC_SAVE_DATA_FD: i32 = 999;

/// The recorder ensures the tracee keeps access to the original root
/// directory after a chroot() through this fd. Tracee close()es of it are
/// silently ignored.
pub const REDO_RESERVED_ROOT_DIR_FD: i32 = 1000;
