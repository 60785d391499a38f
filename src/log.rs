use crate::kernel_metadata::errno_name;
use backtrace::Backtrace;
use nix::errno::errno;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Result, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Clone)]
struct LogModule {
    name: String,
    level: LogLevel,
}

#[derive(Copy, Clone, Eq, PartialEq, PartialOrd)]
pub enum LogLevel {
    LogFatal,
    LogError,
    LogWarn,
    LogInfo,
    LogDebug,
}

pub use LogLevel::*;

struct LogGlobals {
    level_map: HashMap<String, LogLevel>,
    log_modules_cache: HashMap<String, LogModule>,
    // Possibly buffered
    log_file: Box<dyn Write + Send>,
    default_level: LogLevel,
}

lazy_static! {
    static ref LOG_GLOBALS: Mutex<LogGlobals> = {
        let maybe_filename = option_env!("REDO_LOG_FILE");
        let maybe_append_filename = option_env!("REDO_APPEND_LOG_FILE");
        let mut f: Box<dyn Write + Send>;
        if let Some(filename) = maybe_filename {
            f = Box::new(File::create(filename).unwrap());
        } else if let Some(append_filename) = maybe_append_filename {
            f = Box::new(
                OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(append_filename)
                    .unwrap(),
            );
        } else {
            f = Box::new(io::stderr());
        }

        if let Some(buf_size) = option_env!("REDO_LOG_BUFFER") {
            let log_buffer_size = buf_size.parse::<usize>().unwrap();
            f = Box::new(BufWriter::with_capacity(log_buffer_size, f));
        }

        Mutex::new(LogGlobals {
            level_map: HashMap::new(),
            log_modules_cache: HashMap::new(),
            log_file: f,
            default_level: LogWarn,
        })
    };
}

/// Given a module name, what is its log level?
fn get_log_level(module_name: &str, l: &MutexGuard<LogGlobals>) -> LogLevel {
    // Filenames are case sensitive on Linux, so no lowercasing here.
    match l.level_map.get(module_name) {
        Some(log_level) => *log_level,
        None => l.default_level,
    }
}

/// Given a filename what is the corresponding module name?
fn filename_to_module_name(filename: &str) -> String {
    let path = Path::new(filename);
    path.file_stem().unwrap().to_string_lossy().to_string()
}

/// Given the filename get the corresponding LogModule.
fn get_log_module(filename: &str, l: &mut MutexGuard<LogGlobals>) -> LogModule {
    if let Some(log_module) = l.log_modules_cache.get(filename) {
        log_module.to_owned()
    } else {
        let name = filename_to_module_name(filename);
        let level = get_log_level(&name, l);
        let m = LogModule { level, name };
        l.log_modules_cache.insert(filename.to_owned(), m.clone());
        m
    }
}

fn log_name(level: LogLevel) -> String {
    match level {
        LogFatal => "FATAL".into(),
        LogError => "ERROR".into(),
        LogWarn => "WARN".into(),
        LogInfo => "INFO".into(),
        LogDebug => "DEBUG".into(),
    }
}

pub struct NewLineTerminatingOstream {
    enabled: bool,
    message: Vec<u8>,
    lock: MutexGuard<'static, LogGlobals>,
}

impl NewLineTerminatingOstream {
    fn new(
        level: LogLevel,
        filename: &str,
        line: u32,
        func_name: &str,
        always_enabled: bool,
    ) -> NewLineTerminatingOstream {
        let mut lock = LOG_GLOBALS.lock().unwrap();
        let m = get_log_module(filename, &mut lock);
        let enabled = always_enabled || level <= m.level;
        let mut this = NewLineTerminatingOstream {
            message: Vec::new(),
            enabled,
            lock,
        };
        if enabled {
            if level == LogDebug {
                write!(this, "[{}] ", m.name).unwrap();
            } else {
                write_prefix(&mut this, level, filename, line, func_name);
            }
        }

        this
    }
}

impl Drop for NewLineTerminatingOstream {
    fn drop(&mut self) {
        if self.enabled {
            self.write(b"\n").unwrap();
            self.flush().unwrap();
        }
    }
}

impl Write for NewLineTerminatingOstream {
    fn flush(&mut self) -> Result<()> {
        if !self.message.is_empty() && self.enabled {
            self.lock.log_file.write_all(&self.message)?;
            self.lock.log_file.flush()?;
        }
        self.message.clear();
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.enabled {
            self.message.extend_from_slice(buf);
        }

        // Pretend these were written even when disabled, otherwise callers
        // see a WriteZero error.
        Ok(buf.len())
    }
}

pub fn write_prefix(
    stream: &mut dyn Write,
    level: LogLevel,
    filename: &str,
    line: u32,
    func_name: &str,
) {
    write!(stream, "[{} ", log_name(level)).unwrap();
    if level <= LogError {
        write!(stream, "{}:{} ", filename, line).unwrap();
    }

    write!(stream, "{}()", func_name).unwrap();
    let err = errno();
    if level <= LogWarn && err != 0 {
        write!(stream, " errno: {}", errno_name(err)).unwrap();
    }
    write!(stream, "] ").unwrap();
}

pub fn log(
    log_level: LogLevel,
    filename: &str,
    line: u32,
    module_path: &str,
    always_enabled: bool,
) -> NewLineTerminatingOstream {
    NewLineTerminatingOstream::new(log_level, filename, line, module_path, always_enabled)
}

/// Outputs to the (possibly write buffered) log file, or stderr if no log
/// file was specified. The program continues normally afterwards.
macro_rules! log {
    ($log_level:expr, $($args:tt)+) => {
        {
            use ::std::io::Write;
            let mut stream = crate::log::log(
                $log_level,
                file!(),
                line!(),
                module_path!(),
                false
            );
            write!(stream, $($args)+).unwrap()
        }
    };
}

/// Outputs to the log file (or stderr), prints a backtrace and aborts.
macro_rules! fatal {
    ($($args:tt)+) => {
        {
            {
                use ::std::io::Write;
                use crate::log::LogFatal;
                let mut stream = crate::log::log(
                    LogFatal,
                    file!(),
                    line!(),
                    module_path!(),
                    true
                );
                write!(stream, $($args)+).unwrap();
            }
            crate::log::notifying_abort(::backtrace::Backtrace::new())
        }
    };
}

/// Assert an invariant about tracee state. Failure is fatal: we can't
/// record faithfully once a tracee has confounded us, so dump context
/// (tid, the in-progress syscall) and abort.
macro_rules! ed_assert {
    ($task:expr, $cond:expr) => {
        {
            if !$cond {
                {
                    use ::std::io::Write;
                    use crate::log::LogFatal;
                    let mut stream = crate::log::log(
                        LogFatal,
                        file!(),
                        line!(),
                        module_path!(),
                        true
                    );
                    write!(
                        stream,
                        "(tid: {}, syscall: {}) Assertion `{}' failed to hold. ",
                        $task.tid(),
                        crate::kernel_metadata::syscall_name(
                            $task.current_syscall(),
                            $task.arch()
                        ),
                        stringify!($cond)
                    ).unwrap();
                }
                crate::log::notifying_abort(::backtrace::Backtrace::new())
            }
        }
    };
    ($task:expr, $cond:expr, $($args:tt)+) => {
        {
            if !$cond {
                {
                    use ::std::io::Write;
                    use crate::log::LogFatal;
                    let mut stream = crate::log::log(
                        LogFatal,
                        file!(),
                        line!(),
                        module_path!(),
                        true
                    );
                    write!(
                        stream,
                        "(tid: {}, syscall: {}) Assertion `{}' failed to hold. ",
                        $task.tid(),
                        crate::kernel_metadata::syscall_name(
                            $task.current_syscall(),
                            $task.arch()
                        ),
                        stringify!($cond)
                    ).unwrap();
                    write!(stream, $($args)+).unwrap();
                }
                crate::log::notifying_abort(::backtrace::Backtrace::new())
            }
        }
    };
}

/// Dump the stacktrace and abort.
pub fn notifying_abort(bt: Backtrace) -> ! {
    dump_redo_stack(bt);
    std::process::abort();
}

/// Write the backtrace to stderr.
fn dump_redo_stack(bt: Backtrace) {
    write!(io::stderr(), "=== Start redo backtrace:\n").unwrap();
    write!(io::stderr(), "{:?}", bt).unwrap();
    write!(io::stderr(), "=== End redo backtrace\n").unwrap();
}
