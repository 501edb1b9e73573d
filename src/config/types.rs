//! Core configuration types.
//!
//! This module contains the root [`Config`] struct read from `bringup.yaml`.

use super::{parse_duration_string, UnitConfig};
use crate::unit::UnitSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Root configuration structure for bringup.yaml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Settings applied to every unit unless the unit overrides them
    #[serde(default)]
    pub defaults: Defaults,

    /// File that receives every recorded initialization error.
    /// Relative paths are resolved against the config file directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,

    #[serde(default)]
    pub units: BTreeMap<String, UnitDefinition>,
}

impl Config {
    /// Expand a selection of unit names with everything they depend on.
    ///
    /// An empty selection means every unit. The result is sorted and
    /// deduplicated; unknown names are kept so the caller can report them.
    pub fn expand_selection(&self, selection: &[String]) -> Vec<String> {
        if selection.is_empty() {
            return self.units.keys().cloned().collect();
        }

        let mut result = std::collections::BTreeSet::new();
        let mut stack: Vec<&str> = selection.iter().map(String::as_str).collect();
        while let Some(name) = stack.pop() {
            if !result.insert(name.to_string()) {
                continue;
            }
            if let Some(unit) = self.units.get(name) {
                stack.extend(unit.depends_on.iter().map(String::as_str));
            }
        }
        result.into_iter().collect()
    }
}

/// Defaults shared by all units.
///
/// ```yaml
/// defaults:
///   timeout: 30s
///   max_retries: 3
///   retry_interval: 500ms
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<String>,
}

/// One unit entry under `units:`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDefinition {
    #[serde(rename = "type")]
    pub kind: ResourceKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<String>,

    #[serde(default)]
    pub config: UnitConfig,
}

impl UnitDefinition {
    pub fn new(kind: ResourceKind, config: UnitConfig) -> Self {
        Self {
            kind,
            depends_on: Vec::new(),
            timeout: None,
            max_retries: None,
            retry_interval: None,
            config,
        }
    }

    /// Effective settings: unit value, then `defaults`, then built-in default.
    /// Unparseable durations fall through to the next level; `validate()`
    /// reports them.
    pub fn settings(&self, defaults: &Defaults) -> UnitSettings {
        let builtin = UnitSettings::default();
        let duration = |own: &Option<String>, shared: &Option<String>| {
            own.as_deref()
                .and_then(parse_duration_string)
                .or_else(|| shared.as_deref().and_then(parse_duration_string))
        };

        UnitSettings {
            timeout: duration(&self.timeout, &defaults.timeout).unwrap_or(builtin.timeout),
            max_retries: self
                .max_retries
                .or(defaults.max_retries)
                .unwrap_or(builtin.max_retries),
            retry_interval: duration(&self.retry_interval, &defaults.retry_interval)
                .unwrap_or(builtin.retry_interval),
        }
    }
}

/// Kind of infrastructure resource a unit brings up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Database,
    Cache,
    Queue,
    #[serde(alias = "file_system")]
    Filesystem,
    Network,
    #[serde(alias = "api")]
    ExternalApi,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Database => "database",
            ResourceKind::Cache => "cache",
            ResourceKind::Queue => "queue",
            ResourceKind::Filesystem => "filesystem",
            ResourceKind::Network => "network",
            ResourceKind::ExternalApi => "external_api",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
