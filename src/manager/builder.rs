use super::{StateManager, UnitFactory};
use crate::config::Config;
use crate::error::Result;
use crate::monitor::PerformanceMonitor;
use crate::status::{ErrorSink, FanoutSink, FileSink, TracingSink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builder for constructing a [`StateManager`] with a fluent API.
///
/// With a configuration the builder validates it, creates one unit per
/// entry under `units:` and registers it with its `depends_on` edges.
///
/// # Example
///
/// ```no_run
/// use bringup::{Config, StateManager};
/// use std::path::PathBuf;
///
/// # async fn example() -> Result<(), bringup::Error> {
/// let config = Config::default();
/// let manager = StateManager::builder()
///     .config(config)
///     .work_dir(PathBuf::from("."))
///     .build()
///     .await?;
/// manager.initialize_all().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct StateManagerBuilder {
    config: Option<Config>,
    work_dir: Option<PathBuf>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    monitor: Option<PerformanceMonitor>,
    cancellation_token: Option<CancellationToken>,
}

impl StateManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Directory relative paths in the configuration are resolved against.
    ///
    /// If not set, defaults to the current directory (".").
    pub fn work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = Some(dir);
        self
    }

    /// Sink for every recorded error. Defaults to [`TracingSink`]. A configured
    /// `error_log` file is added next to it.
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn monitor(mut self, monitor: PerformanceMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the manager, registering every configured unit.
    ///
    /// # Errors
    ///
    /// Returns the validation error of an invalid configuration.
    pub async fn build(self) -> Result<StateManager> {
        let work_dir = self.work_dir.unwrap_or_else(|| PathBuf::from("."));
        let monitor = self.monitor.unwrap_or_default();
        let base_sink = self.error_sink.unwrap_or_else(|| Arc::new(TracingSink));

        let Some(config) = self.config else {
            return Ok(StateManager::with_parts(
                base_sink,
                monitor,
                self.cancellation_token.unwrap_or_default(),
            ));
        };
        config.validate()?;

        let sink: Arc<dyn ErrorSink> = match config.error_log {
            Some(ref path) => {
                let path = PathBuf::from(path);
                let path = if path.is_absolute() { path } else { work_dir.join(path) };
                Arc::new(FanoutSink::new(vec![base_sink, Arc::new(FileSink::new(path))]))
            }
            None => base_sink,
        };

        let manager = StateManager::with_parts(
            Arc::clone(&sink),
            monitor.clone(),
            self.cancellation_token.unwrap_or_default(),
        );
        let factory = UnitFactory::new(work_dir, sink, monitor);

        for (name, definition) in &config.units {
            let unit = factory.create(name, definition, &config.defaults);
            let dependencies: Vec<&str> = definition.depends_on.iter().map(String::as_str).collect();
            manager
                .register_initialization(name, unit, &dependencies)
                .await?;
        }

        tracing::debug!(units = config.units.len(), "State manager built from config");
        Ok(manager)
    }
}
