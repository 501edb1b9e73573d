use super::{ErrorSink, TracingSink};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Outcome record of one initialization unit.
///
/// `failed` is not stored: a status is failed exactly when it holds at least
/// one error, so the two can never disagree. An initialized status is never
/// failed: recording an error clears `initialized`, and marking a failed
/// status as initialized is refused.
pub struct InitializationStatus {
    unit: String,
    initialized: bool,
    errors: Vec<String>,
    data: HashMap<String, Value>,
    dependencies: BTreeSet<String>,
    sink: Arc<dyn ErrorSink>,
}

impl InitializationStatus {
    /// Create an empty status whose errors go to `tracing`.
    pub fn new(unit: impl Into<String>) -> Self {
        Self::with_sink(unit, Arc::new(TracingSink))
    }

    pub fn with_sink(unit: impl Into<String>, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            unit: unit.into(),
            initialized: false,
            errors: Vec::new(),
            data: HashMap::new(),
            dependencies: BTreeSet::new(),
            sink,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn set_sink(&mut self, sink: Arc<dyn ErrorSink>) {
        self.sink = sink;
    }

    /// Append an error, mark the status failed and forward the message to
    /// the error sink (exactly once per call).
    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.sink.record(&self.unit, &message);
        self.errors.push(message);
        self.initialized = false;
    }

    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Look up a data entry. A missing key is `None`, never an error.
    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    /// Mark the status initialized (or not).
    ///
    /// Returns `false` when `true` was requested on a failed status; the
    /// status is left untouched in that case.
    pub fn set_initialized(&mut self, initialized: bool) -> bool {
        if initialized && self.is_failed() {
            tracing::warn!(
                unit = %self.unit,
                errors = self.errors.len(),
                "Refusing to mark a failed status as initialized"
            );
            return false;
        }
        self.initialized = initialized;
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_failed(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Neither initialized nor failed.
    pub fn is_pending(&self) -> bool {
        !self.initialized && self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Declare a dependency name. Adding the same name twice is a no-op.
    pub fn add_dependency(&mut self, name: impl Into<String>) {
        self.dependencies.insert(name.into());
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Clear every field back to the empty state.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.errors.clear();
        self.data.clear();
        self.dependencies.clear();
    }

    /// Clear the outcome of a previous attempt, keeping declared dependencies.
    pub fn clear_outcome(&mut self) {
        self.initialized = false;
        self.errors.clear();
        self.data.clear();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            unit: self.unit.clone(),
            initialized: self.initialized,
            failed: self.is_failed(),
            errors: self.errors.clone(),
            data: self.data.clone(),
            dependencies: self.dependencies.iter().cloned().collect(),
        }
    }
}

impl fmt::Debug for InitializationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializationStatus")
            .field("unit", &self.unit)
            .field("initialized", &self.initialized)
            .field("errors", &self.errors)
            .field("data", &self.data)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Serializable copy of a status, used for CLI and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub unit: String,
    pub initialized: bool,
    pub failed: bool,
    pub errors: Vec<String>,
    pub data: HashMap<String, Value>,
    pub dependencies: Vec<String>,
}

impl StatusSnapshot {
    /// One-word state label for display.
    pub fn label(&self) -> &'static str {
        if self.failed {
            "failed"
        } else if self.initialized {
            "initialized"
        } else {
            "pending"
        }
    }
}
