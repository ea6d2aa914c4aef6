//! Level-gated logging facade.
//!
//! The library emits diagnostics through one process-wide, replaceable sink.
//! Callers install either a [`LogSink`] instance or a bare callback via
//! [`set_logger_fn`]; nothing is logged until a sink is installed. The
//! `log_*!` macros capture `file!():line!()` as the location tag and skip
//! message formatting entirely when the installed level forbids the record.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use parking_lot::Mutex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Message severities, ordered. [`LogLevel::Mute`] is a sink setting that
/// suppresses everything; it is never a message level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Mute,
}

impl LogLevel {
    fn from_u8(raw: u8) -> LogLevel {
        match raw {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            _ => LogLevel::Mute,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LogLevel::Trace => 0,
            LogLevel::Debug => 1,
            LogLevel::Info => 2,
            LogLevel::Warning => 3,
            LogLevel::Error => 4,
            LogLevel::Mute => 5,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Mute => "MUTE",
        };
        f.write_str(name)
    }
}

/// Level stored with interior mutability so sinks can be shared immutably.
#[derive(Debug)]
struct AtomicLevel(AtomicU8);

impl AtomicLevel {
    fn new(level: LogLevel) -> Self {
        AtomicLevel(AtomicU8::new(level.as_u8()))
    }

    fn get(&self) -> LogLevel {
        LogLevel::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, level: LogLevel) {
        self.0.store(level.as_u8(), Ordering::Relaxed);
    }
}

/// Destination for library diagnostics.
///
/// Implementations must be thread-safe; `message` may be called from any of
/// the library's background threads.
pub trait LogSink: Send + Sync {
    /// Change the sink's level.
    fn set_level(&self, level: LogLevel);

    /// Current sink level.
    fn level(&self) -> LogLevel;

    /// Record `message` produced at `location` with `level`. Only called for
    /// records the sink's level permits.
    fn message(&self, level: LogLevel, location: &str, message: &str);
}

/// Sink wrapping a bare callback.
pub struct FuncSink {
    level: AtomicLevel,
    func: Box<dyn Fn(LogLevel, &str, &str) + Send + Sync>,
}

impl FuncSink {
    pub fn new<F>(level: LogLevel, func: F) -> Self
    where
        F: Fn(LogLevel, &str, &str) + Send + Sync + 'static,
    {
        FuncSink { level: AtomicLevel::new(level), func: Box::new(func) }
    }
}

impl LogSink for FuncSink {
    fn set_level(&self, level: LogLevel) {
        self.level.set(level);
    }

    fn level(&self) -> LogLevel {
        self.level.get()
    }

    fn message(&self, level: LogLevel, location: &str, message: &str) {
        (self.func)(level, location, message);
    }
}

/// Sink writing formatted lines to stdout, with errors and warnings diverted
/// to stderr. Lines are `<RFC 3339 UTC>: <LEVEL>: <location>: <message>`,
/// written under an internal mutex so concurrent records never interleave.
pub struct ConsoleSink {
    level: AtomicLevel,
    write_lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn new(level: LogLevel) -> Self {
        ConsoleSink { level: AtomicLevel::new(level), write_lock: Mutex::new(()) }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        ConsoleSink::new(LogLevel::Trace)
    }
}

impl LogSink for ConsoleSink {
    fn set_level(&self, level: LogLevel) {
        self.level.set(level);
    }

    fn level(&self) -> LogLevel {
        self.level.get()
    }

    fn message(&self, level: LogLevel, location: &str, message: &str) {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("-"));
        let line = format!("{timestamp}: {level}: {location}: {message}\n");

        let _guard = self.write_lock.lock();
        if matches!(level, LogLevel::Error | LogLevel::Warning) {
            let _ = std::io::stderr().write_all(line.as_bytes());
        } else {
            let _ = std::io::stdout().write_all(line.as_bytes());
        }
    }
}

/// Sink forwarding records as `tracing` events, for applications that already
/// run a subscriber.
pub struct TracingSink {
    level: AtomicLevel,
}

impl TracingSink {
    pub fn new(level: LogLevel) -> Self {
        TracingSink { level: AtomicLevel::new(level) }
    }
}

impl LogSink for TracingSink {
    fn set_level(&self, level: LogLevel) {
        self.level.set(level);
    }

    fn level(&self) -> LogLevel {
        self.level.get()
    }

    fn message(&self, level: LogLevel, location: &str, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(location, "{message}"),
            LogLevel::Debug => tracing::debug!(location, "{message}"),
            LogLevel::Info => tracing::info!(location, "{message}"),
            LogLevel::Warning => tracing::warn!(location, "{message}"),
            LogLevel::Error => tracing::error!(location, "{message}"),
            LogLevel::Mute => {}
        }
    }
}

fn global() -> &'static RwLock<Option<Arc<dyn LogSink>>> {
    static GLOBAL: RwLock<Option<Arc<dyn LogSink>>> = RwLock::new(None);
    &GLOBAL
}

/// Install `sink` as the process-wide logger, replacing any previous one.
pub fn set_logger(sink: Arc<dyn LogSink>) {
    if let Ok(mut slot) = global().write() {
        *slot = Some(sink);
    }
}

/// Install a bare callback as the logger, with `level` as its initial level.
pub fn set_logger_fn<F>(level: LogLevel, func: F)
where
    F: Fn(LogLevel, &str, &str) + Send + Sync + 'static,
{
    set_logger(Arc::new(FuncSink::new(level, func)));
}

/// Remove the installed logger; subsequent records are dropped.
pub fn clear_logger() {
    if let Ok(mut slot) = global().write() {
        *slot = None;
    }
}

/// Change the installed logger's level. No-op when no logger is installed.
pub fn set_log_level(level: LogLevel) {
    if let Ok(slot) = global().read() {
        if let Some(sink) = slot.as_ref() {
            sink.set_level(level);
        }
    }
}

/// Level of the installed logger, or [`LogLevel::Mute`] when none is set.
pub fn log_level() -> LogLevel {
    match global().read() {
        Ok(slot) => slot.as_ref().map(|sink| sink.level()).unwrap_or(LogLevel::Mute),
        Err(_) => LogLevel::Mute,
    }
}

/// Whether a record at `level` would currently be emitted.
pub fn enabled(level: LogLevel) -> bool {
    level != LogLevel::Mute && level >= log_level()
}

/// Hand a record to the installed sink. Prefer the `log_*!` macros, which
/// check [`enabled`] before formatting.
pub fn emit(level: LogLevel, location: &str, message: &str) {
    if let Ok(slot) = global().read() {
        if let Some(sink) = slot.as_ref() {
            if level != LogLevel::Mute && level >= sink.level() {
                sink.message(level, location, message);
            }
        }
    }
}

#[macro_export]
macro_rules! log_record {
    ($level:expr, $($arg:tt)*) => {
        if $crate::logger::enabled($level) {
            $crate::logger::emit(
                $level,
                concat!(file!(), ":", line!()),
                &format!($($arg)*),
            );
        }
    };
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => { $crate::log_record!($crate::logger::LogLevel::Trace, $($arg)*) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::log_record!($crate::logger::LogLevel::Debug, $($arg)*) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::log_record!($crate::logger::LogLevel::Info, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::log_record!($crate::logger::LogLevel::Warning, $($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::log_record!($crate::logger::LogLevel::Error, $($arg)*) };
}
