use std::collections::VecDeque;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{error, info, warn};

/// Most recent messages kept by a session
pub const STATUS_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn label(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

impl LogEntry {
    pub fn render(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.level.label(),
            self.timestamp.format("%H:%M:%S"),
            self.message
        )
    }
}

/// Bounded operator-facing status log; the oldest entry is dropped when full.
#[derive(Debug, Clone)]
pub struct StatusLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_id: u64,
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::with_capacity(STATUS_LOG_CAPACITY)
    }
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_id: 0,
        }
    }

    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::Info | Level::Success => info!(status = level.label(), "{}", message),
            Level::Warning => warn!("{}", message),
            Level::Error => error!("{}", message),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.next_id += 1;
        self.entries.push_front(LogEntry {
            id: self.next_id,
            timestamp: Local::now(),
            level,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(Level::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Level::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message);
    }

    /// Entries, newest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first, one line per entry
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .rev()
            .map(LogEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
