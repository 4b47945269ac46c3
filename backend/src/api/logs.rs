//! Live activity feed via Server-Sent Events (SSE).
//!
//! Submissions, reviews and forwarding outcomes are broadcast here so an
//! open reviewer dashboard can refresh without polling. Every entry is also
//! emitted as a `tracing` event.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Severity for dashboard display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single activity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Inspection the entry is about, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            inspection_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn for_inspection(mut self, id: Uuid) -> Self {
        self.inspection_id = Some(id);
        self
    }
}

/// Global activity broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Broadcasts entries to all connected SSE clients
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Record an entry and send it to all subscribers
    pub fn log(&self, entry: LogEntry) {
        let id = entry.inspection_id.map(|id| id.to_string()).unwrap_or_default();
        match entry.level {
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(inspection_id = %id, "{}", entry.message)
            }
            LogLevel::Warning => tracing::warn!(inspection_id = %id, "{}", entry.message),
            LogLevel::Error => tracing::error!(inspection_id = %id, "{}", entry.message),
        }

        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::info(msg));
}

pub fn log_success(id: Uuid, msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::success(msg).for_inspection(id));
}

pub fn log_warning(id: Uuid, msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::warning(msg).for_inspection(id));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::error(msg));
}
