//! Logging for the updater
//!
//! Components never log through a global. A [`Logger`] wrapping some
//! [`LogSink`] is handed to the [`crate::Updater`] at construction and cloned
//! into whatever needs it. The default sink discards everything so a host
//! application sees no output unless it asks for it.

use chrono::Local;
use std::io::Write;
use std::sync::{Arc, Mutex};

// ============================================================================
// Log Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Download,
    Install,
    Warning,
    Error,
}

impl LogLevel {
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Info => "[INFO]",
            LogLevel::Download => "[DOWNLOAD]",
            LogLevel::Install => "[INSTALL]",
            LogLevel::Warning => "[WARNING]",
            LogLevel::Error => "[ERROR]",
        }
    }

    fn as_log_level(&self) -> log::Level {
        match self {
            LogLevel::Info | LogLevel::Download | LogLevel::Install => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination for updater log lines
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Discards every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Writes `[HH:MM:SS] [LEVEL] message` lines to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn log(&self, level: LogLevel, message: &str) {
        let timestamp = Local::now().format("%H:%M:%S");
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{}] {} {}",
            timestamp,
            level.prefix(),
            message
        );
    }
}

/// Forwards to the `log` crate facade under the `gh_selfupdate` target
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn log(&self, level: LogLevel, message: &str) {
        log::log!(target: "gh_selfupdate", level.as_log_level(), "{} {}", level.prefix(), message);
    }
}

/// Keeps every line in memory; handy for tests and for UIs that show a
/// transcript after the update finishes.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, message.to_string()));
        }
    }
}

// ============================================================================
// Logger handle
// ============================================================================

/// Cheaply clonable handle to a shared sink
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(NullSink)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

impl Logger {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn from_arc(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        self.sink.log(level, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn download(&self, message: &str) {
        self.log(LogLevel::Download, message);
    }

    pub fn install(&self, message: &str) {
        self.log(LogLevel::Install, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}
