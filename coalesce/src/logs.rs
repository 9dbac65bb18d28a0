//! Step log channel.
//!
//! Every log line of a run goes through one process-wide broadcaster. Entries
//! are printed to stdout and broadcast to subscribers, such as the SSE
//! endpoint of the HTTP server.
//!
//! Debug and row-level entries are only emitted when the verbosity threshold
//! allows it. The threshold comes from `COALESCE_LOG_LEVEL` and can be
//! changed with [`set_verbosity`].

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::broadcast;

/// Environment variable holding the initial verbosity.
pub const LOG_LEVEL_ENV: &str = "COALESCE_LOG_LEVEL";

/// Log level, ordered from most to least severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Success,
    Info,
    Debug,
    Rowlevel,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "success" => Ok(LogLevel::Success),
            "info" | "basic" => Ok(LogLevel::Info),
            "debug" | "detailed" => Ok(LogLevel::Debug),
            "rowlevel" | "row" => Ok(LogLevel::Rowlevel),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Name of the step that logged the entry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            step: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::from_env);

/// Broadcasts log entries to all subscribers
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
    verbosity: AtomicU8,
}

impl LogBroadcaster {
    pub fn new(verbosity: LogLevel) -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            sender,
            verbosity: AtomicU8::new(verbosity as u8),
        }
    }

    fn from_env() -> Self {
        let level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(LogLevel::Info);
        Self::new(level)
    }

    pub fn set_verbosity(&self, level: LogLevel) {
        self.verbosity.store(level as u8, Ordering::Relaxed);
    }

    /// Whether entries of `level` pass the verbosity threshold.
    pub fn enabled(&self, level: LogLevel) -> bool {
        (level as u8) <= self.verbosity.load(Ordering::Relaxed)
    }

    /// Print and broadcast an entry, if its level is enabled.
    pub fn log(&self, entry: LogEntry) {
        if !self.enabled(entry.level) {
            return;
        }

        let prefix = match entry.level {
            LogLevel::Info | LogLevel::Debug | LogLevel::Rowlevel => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        };
        match &entry.step {
            Some(step) => println!("{} {} - {}", prefix, step, entry.message),
            None => println!("{} {}", prefix, entry.message),
        }

        // Ignore if no receivers
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

/// Change the global verbosity threshold.
pub fn set_verbosity(level: LogLevel) {
    LOG_BROADCASTER.set_verbosity(level);
}

/// Whether the global broadcaster emits entries of `level`.
pub fn log_enabled(level: LogLevel) -> bool {
    LOG_BROADCASTER.enabled(level)
}

pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Info, msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Success, msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Warning, msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Error, msg));
}

/// Log on behalf of a step.
pub fn log_step(level: LogLevel, step: &str, msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(level, msg).with_step(step));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!("rowlevel".parse::<LogLevel>().unwrap(), LogLevel::Rowlevel);
        assert_eq!("Basic".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_threshold() {
        let logs = LogBroadcaster::new(LogLevel::Info);
        assert!(logs.enabled(LogLevel::Error));
        assert!(logs.enabled(LogLevel::Info));
        assert!(!logs.enabled(LogLevel::Debug));

        logs.set_verbosity(LogLevel::Rowlevel);
        assert!(logs.enabled(LogLevel::Rowlevel));
    }

    #[test]
    fn test_subscribers_receive_enabled_entries() {
        let logs = LogBroadcaster::new(LogLevel::Info);
        let mut rx = logs.subscribe();

        logs.log(LogEntry::new(LogLevel::Debug, "hidden"));
        logs.log(LogEntry::new(LogLevel::Error, "shown").with_step("coalesce"));

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.message, "shown");
        assert_eq!(entry.step.as_deref(), Some("coalesce"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_entry_json() {
        let entry = LogEntry::new(LogLevel::Warning, "careful");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], "warning");
        assert!(json.get("step").is_none());
    }
}
