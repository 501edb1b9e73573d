//! Free-form per-unit configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Configuration of one initialization unit: string keys mapped to
/// arbitrary values.
///
/// ```
/// use bringup::config::UnitConfig;
///
/// let config = UnitConfig::new()
///     .with("host", "localhost")
///     .with("port", 6379);
/// assert_eq!(config.port("port"), Some(6379));
/// assert!(!config.has("password"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitConfig(Map<String, Value>);

impl UnitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// A key counts as present when it is set to something other than
    /// `null` or an empty string.
    pub fn has(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Read an unsigned integer given either as a number or a numeric string.
    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn port(&self, key: &str) -> Option<u16> {
        self.u64(key)
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p != 0)
    }

    /// Read a list of strings. `None` if the key is missing or holds
    /// anything but an array of strings.
    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        self.0
            .get(key)?
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Read a map of string values. Numbers and booleans are stringified.
    pub fn string_map(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.0
            .get(key)?
            .as_object()?
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                }?;
                Some((k.clone(), value))
            })
            .collect()
    }

    /// Make a relative path under `key` absolute against `base`.
    pub fn resolve_path(&mut self, key: &str, base: &Path) {
        let Some(raw) = self.str(key) else {
            return;
        };
        let path = Path::new(raw);
        if raw == ":memory:" || path.is_absolute() {
            return;
        }
        let resolved = base.join(path).to_string_lossy().into_owned();
        self.0.insert(key.to_string(), Value::String(resolved));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for UnitConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for UnitConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
