//! Unit factory for creating initialization units from configuration.

use crate::config::{Defaults, ResourceKind, UnitConfig, UnitDefinition};
use crate::monitor::PerformanceMonitor;
use crate::resource::{
    CacheStrategy, DatabaseStrategy, ExternalApiStrategy, FilesystemStrategy, NetworkStrategy,
    QueueStrategy,
};
use crate::status::ErrorSink;
use crate::unit::{InitializationUnit, ResourceStrategy, ResourceUnit, UnitSettings};
use std::path::PathBuf;
use std::sync::Arc;

/// Builds boxed units for each [`ResourceKind`], sharing one error sink and
/// one performance monitor.
#[derive(Clone)]
pub struct UnitFactory {
    base_dir: PathBuf,
    sink: Arc<dyn ErrorSink>,
    monitor: PerformanceMonitor,
}

impl UnitFactory {
    /// `base_dir` is the directory relative file paths in unit configs are
    /// resolved against (normally the config file's directory).
    pub fn new(base_dir: impl Into<PathBuf>, sink: Arc<dyn ErrorSink>, monitor: PerformanceMonitor) -> Self {
        Self {
            base_dir: base_dir.into(),
            sink,
            monitor,
        }
    }

    pub fn create(
        &self,
        name: &str,
        definition: &UnitDefinition,
        defaults: &Defaults,
    ) -> Box<dyn InitializationUnit> {
        let settings = definition.settings(defaults);
        let mut config = definition.config.clone();

        match definition.kind {
            ResourceKind::Database => {
                config.resolve_path("database", &self.base_dir);
                self.build(name, DatabaseStrategy, config, settings)
            }
            ResourceKind::Cache => self.build(name, CacheStrategy, config, settings),
            ResourceKind::Queue => self.build(name, QueueStrategy, config, settings),
            ResourceKind::Filesystem => {
                config.resolve_path("root", &self.base_dir);
                self.build(name, FilesystemStrategy, config, settings)
            }
            ResourceKind::Network => self.build(name, NetworkStrategy, config, settings),
            ResourceKind::ExternalApi => self.build(name, ExternalApiStrategy, config, settings),
        }
    }

    fn build<S: ResourceStrategy>(
        &self,
        name: &str,
        strategy: S,
        config: UnitConfig,
        settings: UnitSettings,
    ) -> Box<dyn InitializationUnit> {
        Box::new(
            ResourceUnit::new(name, strategy, config)
                .with_settings(settings)
                .with_error_sink(Arc::clone(&self.sink))
                .with_monitor(self.monitor.clone()),
        )
    }
}
