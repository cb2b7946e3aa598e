//! Per-node logging routed through the `log` facade.
//!
//! Records carry the target `capybarish::node` and are prefixed with the node's
//! full name, so any `log` backend can filter or format them. The crate never
//! installs a backend itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Target used for every node log record
pub const NODE_LOG_TARGET: &str = "capybarish::node";

/// Node log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    /// Unrecoverable condition; emitted at `log::Level::Error`
    Fatal,
}

impl LogLevel {
    fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error | LogLevel::Fatal => log::Level::Error,
        }
    }

    pub fn as_level_filter(self) -> log::LevelFilter {
        self.as_log_level().to_level_filter()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Logger owned by a [`Node`](crate::core::Node)
#[derive(Debug)]
pub struct NodeLogger {
    node_name: String,
    warnings_count: AtomicU64,
    errors_count: AtomicU64,
}

impl NodeLogger {
    pub fn new(node_name: &str) -> Self {
        Self {
            node_name: node_name.to_string(),
            warnings_count: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
        }
    }

    /// Set the process-wide maximum level for every logger
    pub fn set_level(level: LogLevel) {
        log::set_max_level(level.as_level_filter());
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Warn => {
                self.warnings_count.fetch_add(1, Ordering::Relaxed);
            }
            LogLevel::Error | LogLevel::Fatal => {
                self.errors_count.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        if level == LogLevel::Fatal {
            log::log!(target: NODE_LOG_TARGET, level.as_log_level(), "[{}] FATAL: {}", self.node_name, message);
        } else {
            log::log!(target: NODE_LOG_TARGET, level.as_log_level(), "[{}] {}", self.node_name, message);
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn fatal(&self, message: &str) {
        self.log(LogLevel::Fatal, message);
    }

    pub fn warnings_count(&self) -> u64 {
        self.warnings_count.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }
}
