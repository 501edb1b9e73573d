use chrono::Utc;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Durable destination for errors recorded on an [`InitializationStatus`].
///
/// Implementations must never panic and never surface their own failures:
/// a sink that cannot write logs the problem through `tracing` and moves on.
///
/// [`InitializationStatus`]: super::InitializationStatus
pub trait ErrorSink: Send + Sync {
    fn record(&self, unit: &str, message: &str);
}

/// Forwards every error to `tracing::error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn record(&self, unit: &str, message: &str) {
        tracing::error!(unit = %unit, "{}", message);
    }
}

/// Appends timestamped lines to a log file.
///
/// The file and its parent directory are created on first write.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

impl ErrorSink for FileSink {
    fn record(&self, unit: &str, message: &str) {
        let line = format!("{} [{}] {}", Utc::now().to_rfc3339(), unit, message);
        if let Err(e) = self.append(&line) {
            tracing::warn!(
                "Failed to write error log '{}': {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Keeps recorded errors in memory as `(unit, message)` pairs.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ErrorSink for MemorySink {
    fn record(&self, unit: &str, message: &str) {
        self.entries
            .lock()
            .push((unit.to_string(), message.to_string()));
    }
}

/// Forwards each error to every wrapped sink, in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ErrorSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ErrorSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn ErrorSink>) {
        self.sinks.push(sink);
    }
}

impl ErrorSink for FanoutSink {
    fn record(&self, unit: &str, message: &str) {
        for sink in &self.sinks {
            sink.record(unit, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("errors.log");
        let sink = FileSink::new(&path);

        sink.record("database", "first");
        sink.record("cache", "second");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[database] first"));
        assert!(lines[1].ends_with("[cache] second"));
    }

    #[test]
    fn file_sink_swallows_write_failures() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let sink = FileSink::new(dir.path());
        sink.record("unit", "ignored");
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = MemorySink::new();
        let b = MemorySink::new();
        let fanout = FanoutSink::new(vec![Arc::new(a.clone()), Arc::new(b.clone())]);

        fanout.record("queue", "broker unreachable");

        assert_eq!(a.entries(), vec![("queue".to_string(), "broker unreachable".to_string())]);
        assert_eq!(b.len(), 1);
    }
}
