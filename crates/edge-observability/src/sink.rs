//! Log sinks.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::logging::{LogEntry, LogFormat, LogLevel};

/// Destination for log entries.
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Write one entry. Sinks never fail the caller.
    fn write(&self, entry: &LogEntry);
}

/// Sink that keeps entries in memory.
///
/// Used by tests and the CLI to read back what a run logged.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every entry written so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Messages written so far, in order.
    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.message.clone()).collect()
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|e| e.message.contains(needle))
    }

    /// Number of messages containing `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.lock()
            .iter()
            .filter(|e| e.message.contains(needle))
            .count()
    }

    /// Index of the first message containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lock().iter().position(|e| e.message.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn write(&self, entry: &LogEntry) {
        self.lock().push(entry.clone());
    }
}

/// Sink that prints entries to stderr.
#[derive(Debug, Clone)]
pub struct StderrSink {
    format: LogFormat,
    min_level: LogLevel,
}

impl StderrSink {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            min_level: LogLevel::Info,
        }
    }

    /// Set minimum log level.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }
}

impl LogSink for StderrSink {
    fn write(&self, entry: &LogEntry) {
        if entry.level < self.min_level {
            return;
        }
        eprintln!("{}", entry.render(self.format));
    }
}

/// Sink that forwards every entry to several sinks.
#[derive(Debug, Default)]
pub struct TeeSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl TeeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a downstream sink.
    pub fn with(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl LogSink for TeeSink {
    fn write(&self, entry: &LogEntry) {
        for sink in &self.sinks {
            sink.write(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_core::RenderPhase;

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(LogLevel::Info, message, RenderPhase::Dynamic)
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.write(&entry("first"));
        sink.write(&entry("second"));

        assert_eq!(sink.messages(), vec!["first", "second"]);
        assert_eq!(sink.position("second"), Some(1));
        assert!(sink.contains("fir"));
    }

    #[test]
    fn test_memory_sink_keeps_duplicates() {
        let sink = MemorySink::new();
        sink.write(&entry("same"));
        sink.write(&entry("same"));

        assert_eq!(sink.count_matching("same"), 2);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_tee_sink_fans_out() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let tee = TeeSink::new().with(a.clone()).with(b.clone());

        tee.write(&entry("both"));

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
