//! Activity log ring buffer shown by the panel.
//!
//! Holds the most recent `log`/`error` lines received from the backend in a
//! fixed-capacity circular buffer. Older lines fall off the front.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

/// A single activity line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp_ms: i64,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// `[HH:MM:SS] message`, with `ERROR: ` ahead of error messages.
    pub fn line(&self) -> String {
        let time = DateTime::from_timestamp_millis(self.timestamp_ms)
            .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_default();
        match self.level {
            LogLevel::Info => format!("[{time}] {}", self.message),
            LogLevel::Error => format!("[{time}] ERROR: {}", self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

pub const LOG_RING_CAPACITY: usize = 20;

/// Fixed-capacity circular buffer for activity lines.
pub struct LogRingBuffer {
    entries: Vec<Option<LogEntry>>,
    capacity: usize,
    /// Write position (wraps around)
    write_pos: usize,
    /// Number of entries currently stored (≤ capacity)
    count: usize,
    next_id: u64,
}

impl LogRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            entries,
            capacity,
            write_pos: 0,
            count: 0,
            next_id: 1,
        }
    }

    /// Append a line stamped with the current time. Returns its ID.
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) -> u64 {
        self.push_at(level, message.into(), chrono::Utc::now().timestamp_millis())
    }

    fn push_at(&mut self, level: LogLevel, message: String, timestamp_ms: i64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.entries[self.write_pos] = Some(LogEntry {
            id,
            timestamp_ms,
            level,
            message,
        });
        self.write_pos = (self.write_pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }

        id
    }

    /// Return entries oldest first, up to `limit` of the most recent.
    /// A `limit` of 0 returns everything.
    pub fn get_entries(&self, limit: usize) -> Vec<LogEntry> {
        if self.count == 0 {
            return Vec::new();
        }

        let effective_limit = if limit == 0 { self.count } else { limit.min(self.count) };

        let start = if self.count < self.capacity {
            0
        } else {
            self.write_pos // oldest slot once full
        };

        let skip = self.count - effective_limit;
        let mut result = Vec::with_capacity(effective_limit);
        for i in skip..self.count {
            let idx = (start + i) % self.capacity;
            if let Some(entry) = &self.entries[idx] {
                result.push(entry.clone());
            }
        }

        result
    }

    /// Formatted lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.get_entries(0).iter().map(LogEntry::line).collect()
    }

    pub fn clear(&mut self) {
        for slot in self.entries.iter_mut() {
            *slot = None;
        }
        self.write_pos = 0;
        self.count = 0;
        // ids stay monotonic across clears
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for LogRingBuffer {
    fn default() -> Self {
        Self::new(LOG_RING_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
