use super::{Backoff, InitializationUnit, UnitSettings};
use crate::config::UnitConfig;
use crate::error::{Error, Result};
use crate::monitor::PerformanceMonitor;
use crate::status::{ErrorSink, InitializationStatus};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Data a strategy reports back after setup; merged into the unit's status.
pub type Report = Map<String, Value>;

/// Everything a strategy may look at while doing setup or cleanup.
pub struct InitContext<'a> {
    pub unit: &'a str,
    pub config: &'a UnitConfig,
    /// Unique name for throwaway test artifacts (key, queue, file, row)
    pub artifact: &'a str,
    pub monitor: &'a PerformanceMonitor,
    pub timeout: Duration,
}

/// Resource-specific half of a [`ResourceUnit`].
///
/// The unit owns the template (ordering, timeouts, retries, status
/// bookkeeping); the strategy only knows how to talk to one kind of
/// resource.
#[async_trait]
pub trait ResourceStrategy: Send + Sync + 'static {
    /// Driver handle, built lazily and cached for the unit's lifetime.
    type Handle: Send + Sync + 'static;

    fn kind(&self) -> &'static str;

    /// Keys that must be present (non-null, non-empty).
    fn required_keys(&self) -> &'static [&'static str];

    /// Type and value checks beyond presence. Runs only when every required
    /// key is present.
    fn validate(&self, _config: &UnitConfig) -> Vec<String> {
        Vec::new()
    }

    async fn connect(&self, config: &UnitConfig, timeout: Duration) -> Result<Self::Handle>;

    /// Lightweight, side-effect-free liveness check.
    async fn probe(&self, handle: &mut Self::Handle) -> Result<()>;

    /// Setup work plus a minimal round trip through the resource.
    async fn initialize(&self, handle: &mut Self::Handle, ctx: &InitContext<'_>) -> Result<Report>;

    /// Remove the test artifact named `ctx.artifact`. Runs after
    /// `initialize` whether it succeeded, failed or timed out, and must
    /// tolerate the artifact not existing.
    async fn cleanup(&self, handle: &mut Self::Handle, ctx: &InitContext<'_>) -> Result<()>;
}

/// Generic initialization unit parametrized by a resource strategy.
pub struct ResourceUnit<S: ResourceStrategy> {
    name: String,
    strategy: S,
    config: UnitConfig,
    settings: UnitSettings,
    status: InitializationStatus,
    monitor: PerformanceMonitor,
    handle: Option<S::Handle>,
}

impl<S: ResourceStrategy> ResourceUnit<S> {
    pub fn new(name: impl Into<String>, strategy: S, config: UnitConfig) -> Self {
        let name = name.into();
        Self {
            status: InitializationStatus::new(name.clone()),
            name,
            strategy,
            config,
            settings: UnitSettings::default(),
            monitor: PerformanceMonitor::default(),
            handle: None,
        }
    }

    pub fn with_settings(mut self, settings: UnitSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.status.set_sink(sink);
        self
    }

    pub fn with_monitor(mut self, monitor: PerformanceMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn config(&self) -> &UnitConfig {
        &self.config
    }

    pub fn settings(&self) -> &UnitSettings {
        &self.settings
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Whether a driver handle is currently cached.
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        bounded(&self.name, self.settings.timeout, operation, fut).await
    }

    async fn ensure_handle(&mut self) -> Result<()> {
        if self.handle.is_none() {
            let handle = self
                .bounded("connect", self.strategy.connect(&self.config, self.settings.timeout))
                .await?;
            tracing::debug!(unit = %self.name, kind = self.strategy.kind(), "Driver handle created");
            self.handle = Some(handle);
        }
        Ok(())
    }

    async fn probe_once(&mut self) -> Result<()> {
        self.ensure_handle().await?;
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::Protocol("driver handle missing after connect".to_string()));
        };
        bounded(&self.name, self.settings.timeout, "probe", self.strategy.probe(handle)).await
    }

    fn fail_initialization(&mut self, message: String) -> Error {
        self.status.add_error(message.clone());
        Error::Initialization {
            unit: self.name.clone(),
            message,
        }
    }
}

async fn bounded<T>(
    unit: &str,
    timeout: Duration,
    operation: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            unit: unit.to_string(),
            operation: operation.to_string(),
        }),
    }
}

/// Unique artifact name for one initialization attempt.
fn artifact_name(unit: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let safe: String = unit
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("bringup_probe_{}_{}_{}", safe, std::process::id(), nanos)
}

#[async_trait]
impl<S: ResourceStrategy> InitializationUnit for ResourceUnit<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        self.strategy.kind()
    }

    fn status(&self) -> &InitializationStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut InitializationStatus {
        &mut self.status
    }

    async fn validate_configuration(&mut self) -> Result<()> {
        let mut problems: Vec<String> = self
            .strategy
            .required_keys()
            .iter()
            .filter(|key| !self.config.has(key))
            .map(|key| format!("missing required configuration key '{}'", key))
            .collect();

        if problems.is_empty() {
            problems = self.strategy.validate(&self.config);
        }

        if problems.is_empty() {
            tracing::debug!(unit = %self.name, "Configuration valid");
            return Ok(());
        }

        for problem in &problems {
            self.status.add_error(problem.clone());
        }
        Err(Error::Configuration {
            unit: self.name.clone(),
            message: problems.join("; "),
        })
    }

    async fn test_connection(&mut self) -> bool {
        let attempts = self.settings.max_retries.saturating_add(1);
        let mut backoff = Backoff::new(self.settings.retry_interval);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.probe_once().await {
                Ok(()) => {
                    tracing::debug!(unit = %self.name, attempt, "Connection test passed");
                    return true;
                }
                Err(e) => {
                    last_error = e.to_string();
                    // Reconnect from scratch on the next attempt
                    self.handle = None;
                    if attempt < attempts {
                        let delay = backoff.next_delay();
                        tracing::warn!(
                            unit = %self.name,
                            attempt,
                            attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            "Connection test failed: {}",
                            last_error
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.status.add_error(format!(
            "connection test failed after {} attempt(s): {}",
            attempts, last_error
        ));
        false
    }

    async fn perform_initialization(&mut self) -> Result<()> {
        if let Err(e) = self.ensure_handle().await {
            return Err(self.fail_initialization(e.to_string()));
        }

        let artifact = artifact_name(&self.name);
        let timeout = self.settings.timeout;
        let ctx = InitContext {
            unit: &self.name,
            config: &self.config,
            artifact: &artifact,
            monitor: &self.monitor,
            timeout,
        };
        let Some(handle) = self.handle.as_mut() else {
            let message = "driver handle missing after connect".to_string();
            return Err(self.fail_initialization(message));
        };

        let outcome = bounded(
            ctx.unit,
            timeout,
            "perform_initialization",
            self.strategy.initialize(handle, &ctx),
        )
        .await;

        let cleanup = if matches!(outcome, Err(Error::Timeout { .. })) {
            // The abandoned call may still have a reply in flight on this handle
            match bounded(ctx.unit, timeout, "connect", self.strategy.connect(ctx.config, timeout)).await {
                Ok(fresh) => {
                    *handle = fresh;
                    bounded(ctx.unit, timeout, "cleanup", self.strategy.cleanup(handle, &ctx)).await
                }
                Err(e) => Err(e),
            }
        } else {
            bounded(ctx.unit, timeout, "cleanup", self.strategy.cleanup(handle, &ctx)).await
        };

        match (outcome, cleanup) {
            (Ok(report), Ok(())) => {
                for (key, value) in report {
                    self.status.add_data(key, value);
                }
                self.status.set_initialized(true);
                Ok(())
            }
            (Ok(_), Err(cleanup_err)) => {
                self.handle = None;
                Err(self.fail_initialization(format!(
                    "cleanup of test artifact '{}' failed: {}",
                    artifact, cleanup_err
                )))
            }
            (Err(e), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    tracing::warn!(
                        unit = %self.name,
                        artifact = %artifact,
                        "Cleanup after failed initialization also failed: {}",
                        cleanup_err
                    );
                }
                // A dead handle would fail every later attempt too
                self.handle = None;
                Err(self.fail_initialization(e.to_string()))
            }
        }
    }
}
