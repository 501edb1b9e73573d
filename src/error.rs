// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// A unit's configuration is missing a required key or has a bad value.
    #[error("Configuration error in '{unit}': {message}")]
    #[diagnostic(
        code(bringup::unit::configuration),
        help("Fix the `config:` block of unit '{unit}' in bringup.yaml")
    )]
    Configuration { unit: String, message: String },

    /// The connectivity probe of a unit failed.
    #[error("Connection test failed for '{unit}': {message}")]
    #[diagnostic(
        code(bringup::unit::connection),
        help("Check that the resource behind '{unit}' is reachable, or raise `max_retries`/`timeout`")
    )]
    Connection { unit: String, message: String },

    /// The setup work of a unit failed after validation and connection passed.
    #[error("Initialization of '{unit}' failed: {message}")]
    #[diagnostic(code(bringup::unit::initialization))]
    Initialization { unit: String, message: String },

    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    #[diagnostic(
        code(bringup::dependency::circular),
        help("Units cannot depend on each other in a cycle. Review the depends_on fields")
    )]
    CircularDependency(Vec<String>),

    #[error("Unit not found: {0}")]
    #[diagnostic(
        code(bringup::unit::not_found),
        help("List registered units with `bringup order`")
    )]
    UnitNotFound(String),

    #[error("Unit '{0}' is already registered")]
    #[diagnostic(code(bringup::unit::duplicate))]
    DuplicateUnit(String),

    #[error("Unit '{unit}' depends on '{dependency}', which was never registered")]
    #[diagnostic(
        code(bringup::dependency::unregistered),
        help("Declare '{dependency}' under `units:` or remove it from the depends_on list of '{unit}'")
    )]
    UnregisteredDependency { unit: String, dependency: String },

    #[error("Unit '{unit}' cannot start: dependency '{dependency}' is not initialized")]
    #[diagnostic(
        code(bringup::dependency::not_ready),
        help("Initialize '{dependency}' first, or run `bringup up` to follow the dependency order")
    )]
    DependencyNotReady { unit: String, dependency: String },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(bringup::config::validation),
        help("Run `bringup validate` for detailed validation errors")
    )]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout during {operation} of '{unit}'")]
    #[diagnostic(
        code(bringup::unit::timeout),
        help("Increase the `timeout` of unit '{unit}' in bringup.yaml")
    )]
    Timeout { unit: String, operation: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<Error>),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(bringup::database::error))]
    Database(#[from] tokio_rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Configuration { unit, .. } => Some(format!(
                "Check the required keys for unit '{}' and run `bringup check {}`.",
                unit, unit
            )),
            Error::Connection { unit, .. } => Some(format!(
                "The resource behind '{}' did not answer. Verify host/port, then retry with `bringup check {}`.",
                unit, unit
            )),
            Error::CircularDependency(path) => Some(format!(
                "Units cannot depend on each other in a cycle. Review the depends_on fields for: {}",
                path.join(", ")
            )),
            Error::UnitNotFound(name) => Some(format!(
                "No unit named '{}'. Run `bringup order` to list the registered units.",
                name
            )),
            Error::UnregisteredDependency { dependency, .. } => Some(format!(
                "Add a unit named '{}' to bringup.yaml or drop it from depends_on.",
                dependency
            )),
            Error::DependencyNotReady { dependency, .. } => Some(format!(
                "Run `bringup up {}` first, or `bringup up` to initialize everything in order.",
                dependency
            )),
            Error::Timeout { unit, .. } => Some(format!(
                "Raise `timeout` for '{}' (e.g. `timeout: 60s`).",
                unit
            )),
            Error::Validation(_) | Error::Parse(_) | Error::Yaml(_) => {
                Some("Validate your config with: bringup validate".to_string())
            }
            Error::Database(e) => {
                let err_str = e.to_string();
                if err_str.contains("database is locked") || err_str.contains("SQLITE_BUSY") {
                    Some("Another process holds the database. Stop it or raise the unit timeout.".to_string())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }

    /// Name of the unit this error belongs to, when it is unit-scoped.
    pub fn unit(&self) -> Option<&str> {
        match self {
            Error::Configuration { unit, .. }
            | Error::Connection { unit, .. }
            | Error::Initialization { unit, .. }
            | Error::UnregisteredDependency { unit, .. }
            | Error::DependencyNotReady { unit, .. }
            | Error::Timeout { unit, .. } => Some(unit),
            Error::UnitNotFound(unit) | Error::DuplicateUnit(unit) => Some(unit),
            _ => None,
        }
    }

    /// Collapse a list of errors into a single error.
    pub(crate) fn collect(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multiple(errors)),
        }
    }
}
