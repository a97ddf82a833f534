use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Default maximum number of log lines to keep in memory
pub const DEFAULT_MAX_LOG_LINES: usize = 10000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    /// Name of the folder pair the entry is about, if any.
    pub subtree: Option<String>,
}

/// Bounded activity history of the pipeline, kept for the presentation layer.
/// Every entry is forwarded to the `log` facade as well.
pub struct LogManager {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    next_id: AtomicU64,
    max_lines: usize,
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl LogManager {
    pub fn new(max_lines: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(max_lines.min(1024)))),
            next_id: AtomicU64::new(0),
            max_lines,
        }
    }

    pub fn log(&self, level: LogLevel, message: &str, subtree: Option<&str>) {
        let facade_level: log::Level = level.into();
        match subtree {
            Some(name) => log::log!(facade_level, "[{name}] {message}"),
            None => log::log!(facade_level, "{message}"),
        }

        let entry = LogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.to_string(),
            subtree: subtree.map(str::to_string),
        };

        // A poisoned lock only means another thread panicked mid-push.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push_back(entry);
        while entries.len() > self.max_lines {
            entries.pop_front();
        }
    }

    pub fn info(&self, message: &str, subtree: Option<&str>) {
        self.log(LogLevel::Info, message, subtree);
    }

    pub fn warn(&self, message: &str, subtree: Option<&str>) {
        self.log(LogLevel::Warning, message, subtree);
    }

    pub fn error(&self, message: &str, subtree: Option<&str>) {
        self.log(LogLevel::Error, message, subtree);
    }

    pub fn get_logs(&self, subtree: Option<&str>) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match subtree {
            Some(name) => entries
                .iter()
                .filter(|l| l.subtree.as_deref() == Some(name))
                .cloned()
                .collect(),
            None => entries.iter().cloned().collect(),
        }
    }

    /// Get logs with pagination for better performance with large log sets
    pub fn get_logs_paginated(&self, subtree: Option<&str>, offset: usize, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|l| subtree.is_none() || l.subtree.as_deref() == subtree)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_manager_log() {
        let manager = LogManager::new(10);

        manager.info("test message", None);
        manager.warn("another message", Some("GameA"));

        let logs = manager.get_logs(None);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].level, LogLevel::Warning);
        assert_eq!(logs[1].subtree.as_deref(), Some("GameA"));
        assert!(logs[0].id < logs[1].id);
    }

    #[test]
    fn test_log_manager_rotation() {
        let manager = LogManager::new(3);

        for i in 0..5 {
            manager.info(&format!("message {}", i), None);
        }

        let logs = manager.get_logs(None);
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "message 2");
        assert_eq!(logs[2].message, "message 4");
    }

    #[test]
    fn test_log_manager_filter_by_subtree() {
        let manager = LogManager::new(10);

        manager.info("message1", None);
        manager.info("message2", Some("a"));
        manager.error("message3", Some("a"));

        assert_eq!(manager.get_logs(Some("a")).len(), 2);
        assert!(manager.get_logs(Some("nonexistent")).is_empty());
    }

    #[test]
    fn test_log_manager_pagination() {
        let manager = LogManager::new(100);

        for i in 0..20 {
            manager.info(&format!("message {}", i), None);
        }

        assert_eq!(manager.get_logs_paginated(None, 0, 10).len(), 10);
        let page2 = manager.get_logs_paginated(None, 10, 10);
        assert_eq!(page2.len(), 10);
        assert_eq!(page2[0].message, "message 10");
        assert!(manager.get_logs_paginated(None, 20, 10).is_empty());
    }

    #[test]
    fn test_log_manager_thread_safety() {
        let manager = Arc::new(LogManager::new(100));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let lm = Arc::clone(&manager);
                std::thread::spawn(move || lm.info(&format!("Thread {}", i), None))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(manager.get_logs(None).len(), 10);
    }

    #[test]
    fn test_default_max_log_lines() {
        assert_eq!(DEFAULT_MAX_LOG_LINES, 10000);
    }
}
