//! Initialization units.
//!
//! An [`InitializationUnit`] brings up one infrastructure resource in three
//! steps, always invoked in this order:
//!
//! 1. [`validate_configuration`](InitializationUnit::validate_configuration):
//!    structural check of the unit's config. Records the problem and returns
//!    `Error::Configuration`.
//! 2. [`test_connection`](InitializationUnit::test_connection): lightweight
//!    probe. Soft fail: records the problem and returns `false`.
//! 3. [`perform_initialization`](InitializationUnit::perform_initialization):
//!    the setup work. Hard fail: records the problem and returns
//!    `Error::Initialization`.
//!
//! [`run_lifecycle`] drives the three steps. [`ResourceUnit`] is the generic
//! implementation used for every built-in resource kind.

mod resource;
mod retry;

pub use resource::*;
pub use retry::*;

use crate::error::{Error, Result};
use crate::monitor::PerformanceMonitor;
use crate::status::InitializationStatus;
use async_trait::async_trait;
use std::time::Duration;

/// Default bound for a single connect, probe or setup attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after a failed connection test.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first connection-test retry.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Timing knobs of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitSettings {
    /// Bound for each connect, probe, setup and cleanup attempt
    pub timeout: Duration,
    /// Connection-test retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay, doubled per retry
    pub retry_interval: Duration,
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// The three lifecycle steps, in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ValidateConfiguration,
    TestConnection,
    PerformInitialization,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ValidateConfiguration => "validate_configuration",
            Step::TestConnection => "test_connection",
            Step::PerformInitialization => "perform_initialization",
        }
    }
}

/// Bring-up procedure for one infrastructure resource.
#[async_trait]
pub trait InitializationUnit: Send + Sync {
    fn name(&self) -> &str;

    /// Short resource label ("database", "cache", ...)
    fn kind(&self) -> &str;

    fn status(&self) -> &InitializationStatus;

    fn status_mut(&mut self) -> &mut InitializationStatus;

    /// Check required keys and value types.
    async fn validate_configuration(&mut self) -> Result<()>;

    /// Probe the resource. Returns `false` (after recording the error) when
    /// it cannot be reached.
    async fn test_connection(&mut self) -> bool;

    /// Do the setup work. On success the status is marked initialized.
    async fn perform_initialization(&mut self) -> Result<()>;
}

/// Drive `unit` through validate, test and perform, timing each step.
///
/// A failed connection test stops the run with `Error::Connection`; the
/// message is the last error the unit recorded.
pub async fn run_lifecycle(
    unit: &mut dyn InitializationUnit,
    monitor: &PerformanceMonitor,
) -> Result<()> {
    let name = unit.name().to_string();

    let measurement = monitor.start_measurement(&name, Step::ValidateConfiguration.as_str());
    let validated = unit.validate_configuration().await;
    measurement.end();
    validated?;

    let measurement = monitor.start_measurement(&name, Step::TestConnection.as_str());
    let connected = unit.test_connection().await;
    measurement.end();
    if !connected {
        let message = unit
            .status()
            .errors()
            .last()
            .cloned()
            .unwrap_or_else(|| "connection test failed".to_string());
        return Err(Error::Connection {
            unit: name,
            message,
        });
    }

    let measurement = monitor.start_measurement(&name, Step::PerformInitialization.as_str());
    let performed = unit.perform_initialization().await;
    measurement.end();
    performed?;

    tracing::info!(unit = %name, kind = %unit.kind(), "Unit initialized");
    Ok(())
}
