use super::load_config;
use crate::output::UserOutput;
use bringup::config::format_duration;
use std::path::PathBuf;

pub fn run_validate(
    config_path: Option<PathBuf>,
    workdir: Option<PathBuf>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let loaded = match load_config(config_path, workdir) {
        Ok(loaded) => loaded,
        Err(e) => {
            out.error("Configuration failed to load");
            out.error("\nHint: Create a bringup.yaml or pass one with --config");
            return Err(e);
        }
    };

    out.status(&format!("Validating {}...", loaded.path.display()));
    loaded.config.validate()?;
    out.success("Configuration is valid");
    out.blank();

    let config = &loaded.config;
    out.status(&format!("Units: {}", config.units.len()));
    for (name, unit) in &config.units {
        let settings = unit.settings(&config.defaults);
        let mut line = format!(
            "  - {} ({}, timeout {}, {} retries)",
            name,
            unit.kind,
            format_duration(settings.timeout),
            settings.max_retries
        );
        if !unit.depends_on.is_empty() {
            line.push_str(&format!(" depends on: {}", unit.depends_on.join(", ")));
        }
        out.status(&line);
    }

    if let Some(ref log) = config.error_log {
        out.blank();
        out.status(&format!("Error log: {}", loaded.base_dir.join(log).display()));
    }

    Ok(())
}
