use super::LoadedConfig;
use crate::output::UserOutput;
use bringup::manager::UnitFactory;
use bringup::status::TracingSink;
use bringup::{Error, PerformanceMonitor};
use std::sync::Arc;

/// Validate configuration and test connections of the selected units,
/// without performing any initialization.
///
/// Dependencies are not pulled in and not required to be up: every unit is
/// probed on its own, in initialization order.
pub async fn run_check(loaded: &LoadedConfig, units: &[String], out: &dyn UserOutput) -> anyhow::Result<()> {
    let config = &loaded.config;
    config.validate()?;

    for name in units {
        if !config.units.contains_key(name) {
            return Err(Error::UnitNotFound(name.clone()).into());
        }
    }

    let order: Vec<String> = config
        .dependency_graph()?
        .topological_sort()?
        .into_iter()
        .filter(|name| units.is_empty() || units.contains(name))
        .collect();

    let factory = UnitFactory::new(&loaded.base_dir, Arc::new(TracingSink), PerformanceMonitor::new());
    let mut failures = 0usize;

    out.status(&format!("Checking {} unit(s)...", order.len()));
    for name in &order {
        let Some(definition) = config.units.get(name) else {
            continue;
        };
        let mut unit = factory.create(name, definition, &config.defaults);

        out.progress(&format!("  {:<24} ", name));
        let outcome = match unit.validate_configuration().await {
            Err(e) => Err(e.to_string()),
            Ok(()) if unit.test_connection().await => Ok(()),
            Ok(()) => Err(unit
                .status()
                .errors()
                .last()
                .cloned()
                .unwrap_or_else(|| "connection test failed".to_string())),
        };

        match outcome {
            Ok(()) => out.finish_progress("ok"),
            Err(message) => {
                failures += 1;
                out.finish_progress(&format!("FAILED: {}", message));
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} unit(s) failed the check", failures, order.len());
    }
    out.success("All checks passed");
    Ok(())
}
