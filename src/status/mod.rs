//! Outcome records for initialization units.
//!
//! Each unit owns one [`InitializationStatus`]. Errors recorded on it are
//! forwarded to an [`ErrorSink`] supplied by the surrounding application
//! (a log file, the tracing stream, or an in-memory collector).

mod record;
mod sink;

pub use record::{InitializationStatus, StatusSnapshot};
pub use sink::{ErrorSink, FanoutSink, FileSink, MemorySink, TracingSink};
