mod check;
mod order;
mod up;
mod validate;

pub use check::run_check;
pub use order::run_order;
pub use up::run_up;
pub use validate::run_validate;

use bringup::{Config, Parser as ConfigParser};
use std::path::{Path, PathBuf};

/// A configuration file together with where it came from.
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    /// Directory relative paths in the config are resolved against
    pub base_dir: PathBuf,
}

/// Locate and parse the configuration.
///
/// An explicit `config_path` is taken relative to `workdir`; otherwise
/// `bringup.yaml` is searched from `workdir` (or the current directory)
/// upwards. Relative paths inside the config resolve against `workdir` when
/// given, else against the config file's directory.
pub fn load_config(config_path: Option<PathBuf>, workdir: Option<PathBuf>) -> anyhow::Result<LoadedConfig> {
    let parser = ConfigParser::new();
    let start_dir = match workdir {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    let path = match config_path {
        Some(path) if path.is_absolute() => path,
        Some(path) => start_dir.join(path),
        None => ConfigParser::find_config_in_dir(&start_dir)?,
    };
    let config = parser.load_config(&path)?;

    let base_dir = match workdir {
        Some(dir) => dir,
        None => path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or(start_dir),
    };

    Ok(LoadedConfig {
        config,
        path,
        base_dir,
    })
}
