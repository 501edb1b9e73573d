use super::{parse_duration_string, Config};
use crate::dependency::Graph;
use crate::error::{Error, Result};

impl Config {
    /// Validate the structure of the configuration.
    ///
    /// Per-resource keys are not checked here: each unit validates its own
    /// `config:` block as the first step of its lifecycle.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref path) = self.error_log {
            if path.trim().is_empty() {
                return Err(Error::Validation(
                    "'error_log' must not be empty; remove it to log errors to stderr only"
                        .to_string(),
                ));
            }
        }

        check_duration("defaults", "timeout", self.defaults.timeout.as_deref())?;
        check_duration(
            "defaults",
            "retry_interval",
            self.defaults.retry_interval.as_deref(),
        )?;

        for (name, unit) in &self.units {
            if name.trim().is_empty() {
                return Err(Error::Validation("Unit names must not be empty".to_string()));
            }

            check_duration(name, "timeout", unit.timeout.as_deref())?;
            check_duration(name, "retry_interval", unit.retry_interval.as_deref())?;

            for dep in &unit.depends_on {
                if dep == name {
                    return Err(Error::Validation(format!(
                        "Unit '{}' lists itself in depends_on",
                        name
                    )));
                }
                if !self.units.contains_key(dep) {
                    return Err(Error::Validation(format!(
                        "Unit '{}' depends on non-existent unit '{}'",
                        name, dep
                    )));
                }
            }
        }

        self.dependency_graph()?;
        Ok(())
    }

    /// Build the dependency graph of all units. Fails on cycles.
    pub fn dependency_graph(&self) -> Result<Graph> {
        let mut graph = Graph::new();
        for name in self.units.keys() {
            graph.add_node(name);
        }
        for (name, unit) in &self.units {
            for dep in &unit.depends_on {
                graph.add_edge(name, dep)?;
            }
        }
        Ok(graph)
    }
}

fn check_duration(owner: &str, field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if parse_duration_string(v).is_none() => Err(Error::Validation(format!(
            "'{}' has invalid {} '{}'. Use formats like '5s', '30s', '1m', '500ms'",
            owner, field, v
        ))),
        _ => Ok(()),
    }
}
