use crate::config::UnitConfig;
use crate::error::{Error, Result};
use crate::unit::{InitContext, Report, ResourceStrategy};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Filesystem bring-up: a root directory with optional subdirectories and
/// permissions, proven writable by a test file round trip.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemStrategy;

impl FilesystemStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// Parse an octal permission string such as `"0750"` or `"750"`.
pub fn parse_mode(raw: &str) -> Option<u32> {
    let digits = raw.trim().trim_start_matches("0o");
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    u32::from_str_radix(digits, 8).ok()
}

/// Subdirectories must stay under the root.
fn is_contained(relative: &str) -> bool {
    let path = Path::new(relative);
    !relative.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::Io(std::io::Error::new(
        err.kind(),
        format!("{} {}: {}", action, path.display(), err),
    ))
}

#[cfg(unix)]
async fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| io_error("failed to set permissions on", path, e))
}

#[cfg(not(unix))]
async fn apply_mode(path: &Path, _mode: u32) -> Result<()> {
    debug!(path = %path.display(), "Permission modes are ignored on this platform");
    Ok(())
}

#[async_trait]
impl ResourceStrategy for FilesystemStrategy {
    type Handle = PathBuf;

    fn kind(&self) -> &'static str {
        "filesystem"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["root"]
    }

    fn validate(&self, config: &UnitConfig) -> Vec<String> {
        let mut problems = Vec::new();
        if config.str("root").is_none() {
            problems.push("'root' must be a path string".to_string());
        }
        if config.has("directories") {
            match config.string_list("directories") {
                Some(dirs) => {
                    for dir in dirs.iter().filter(|d| !is_contained(d)) {
                        problems.push(format!(
                            "directory '{}' must be a relative path inside 'root'",
                            dir
                        ));
                    }
                }
                None => problems.push("'directories' must be a list of strings".to_string()),
            }
        }
        if config.has("mode") && config.str("mode").and_then(parse_mode).is_none() {
            problems.push("'mode' must be an octal permission string such as \"0755\"".to_string());
        }
        problems
    }

    async fn connect(&self, config: &UnitConfig, _timeout: Duration) -> Result<PathBuf> {
        config
            .str("root")
            .map(PathBuf::from)
            .ok_or_else(|| Error::Protocol("'root' is not set".to_string()))
    }

    async fn probe(&self, root: &mut PathBuf) -> Result<()> {
        // The root itself may be created later; its nearest existing
        // ancestor must be a writable directory.
        let mut candidate = root.as_path();
        let metadata = loop {
            match tokio::fs::metadata(candidate).await {
                Ok(metadata) => break metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => match candidate.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => candidate = parent,
                    _ => return Err(io_error("no existing ancestor for", root, e)),
                },
                Err(e) => return Err(io_error("cannot access", candidate, e)),
            }
        };

        if !metadata.is_dir() {
            return Err(Error::Protocol(format!(
                "{} exists but is not a directory",
                candidate.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(Error::Protocol(format!(
                "{} is read-only",
                candidate.display()
            )));
        }
        Ok(())
    }

    async fn initialize(&self, root: &mut PathBuf, ctx: &InitContext<'_>) -> Result<Report> {
        let mode = ctx.config.str("mode").and_then(parse_mode);
        let directories = ctx.config.string_list("directories").unwrap_or_default();

        tokio::fs::create_dir_all(&*root)
            .await
            .map_err(|e| io_error("failed to create", root, e))?;

        let mut created = Vec::with_capacity(directories.len());
        for dir in &directories {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| io_error("failed to create", &path, e))?;
            if let Some(mode) = mode {
                apply_mode(&path, mode).await?;
            }
            created.push(Value::from(path.to_string_lossy().into_owned()));
        }
        if let Some(mode) = mode {
            apply_mode(root, mode).await?;
        }

        let test_file = root.join(ctx.artifact);
        tokio::fs::write(&test_file, ctx.artifact.as_bytes())
            .await
            .map_err(|e| io_error("failed to write", &test_file, e))?;
        let contents = tokio::fs::read(&test_file)
            .await
            .map_err(|e| io_error("failed to read", &test_file, e))?;
        if contents != ctx.artifact.as_bytes() {
            return Err(Error::Protocol(format!(
                "test file {} read back with different contents",
                test_file.display()
            )));
        }
        tokio::fs::remove_file(&test_file)
            .await
            .map_err(|e| io_error("failed to delete", &test_file, e))?;
        debug!(unit = %ctx.unit, root = %root.display(), "Filesystem round trip passed");

        let mut report = Report::new();
        report.insert(
            "root".to_string(),
            Value::from(root.to_string_lossy().into_owned()),
        );
        report.insert("directories".to_string(), Value::Array(created));
        if let Some(mode) = mode {
            report.insert("mode".to_string(), Value::from(format!("{:04o}", mode)));
        }
        Ok(report)
    }

    async fn cleanup(&self, root: &mut PathBuf, ctx: &InitContext<'_>) -> Result<()> {
        let test_file = root.join(ctx.artifact);
        match tokio::fs::remove_file(&test_file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("failed to delete", &test_file, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn modes_are_octal() {
        assert_eq!(parse_mode("0755"), Some(0o755));
        assert_eq!(parse_mode("700"), Some(0o700));
        assert_eq!(parse_mode("0o640"), Some(0o640));
        assert_eq!(parse_mode("rwx"), None);
        assert_eq!(parse_mode("0758"), None);
        assert_eq!(parse_mode("17777"), None);
    }

    #[test]
    fn directories_stay_inside_root() {
        assert!(is_contained("logs"));
        assert!(is_contained("./data/cache"));
        assert!(!is_contained("../escape"));
        assert!(!is_contained("/etc"));
        assert!(!is_contained(""));
    }

    #[test]
    fn validation_reports_each_problem() {
        let config = UnitConfig::new()
            .with("root", "/tmp/x")
            .with("directories", json!(["ok", "../bad"]))
            .with("mode", "9");
        assert_eq!(FilesystemStrategy.validate(&config).len(), 2);
    }
}
