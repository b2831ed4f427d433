//! Bootstrap configuration loading and root folder resolution
//!
//! Resolution priority for both the config file and the root folder:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user default location (only used if it exists, for config files)
//! 4. Built-in default (fallback)
//!
//! A missing config file is not an error: the caller gets `T::default()` and a warning.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "VIDQUIZ_CONFIG";

/// Environment variable naming the data root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "VIDQUIZ_ROOT_FOLDER";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or full `EnvFilter` directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate the config file for `module_name`.
///
/// Returns `None` when nothing was given explicitly and no per-user file exists.
pub fn resolve_config_path(cli_arg: Option<&Path>, module_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir()
        .map(|d| d.join("vidquiz").join(format!("{}.toml", module_name)));
    match user_config {
        Some(path) if path.exists() => Some(path),
        _ => None,
    }
}

/// Load and deserialize a TOML config file, falling back to defaults when `path` is `None`.
///
/// An explicitly named file that cannot be read or parsed is an error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve the data root folder (database lives here).
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("vidquiz"))
        .unwrap_or_else(|| PathBuf::from("./vidquiz_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_missing_path_yields_defaults() {
        let sample: Sample = load_toml_config(None).unwrap();
        assert!(sample.name.is_empty());
        assert_eq!(sample.logging.level, "info");
    }

    #[test]
    fn test_load_toml_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"qg\"\n[logging]\nlevel = \"debug\"").unwrap();

        let sample: Sample = load_toml_config(Some(file.path())).unwrap();
        assert_eq!(sample.name, "qg");
        assert_eq!(sample.logging.level, "debug");
    }

    #[test]
    fn test_unparseable_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = [unterminated").unwrap();

        let result: Result<Sample> = load_toml_config(Some(file.path()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_cli_arg_beats_env_var() {
        std::env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
        let path = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), "vidquiz-qg");
        assert_eq!(path, Some(PathBuf::from("/tmp/from-cli.toml")));

        let path = resolve_config_path(None, "vidquiz-qg");
        assert_eq!(path, Some(PathBuf::from("/tmp/from-env.toml")));
        std::env::remove_var(CONFIG_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_root_folder_priority() {
        std::env::remove_var(ROOT_FOLDER_ENV_VAR);
        let toml_root = PathBuf::from("/srv/vidquiz");
        assert_eq!(resolve_root_folder(None, Some(&toml_root)), toml_root);

        std::env::set_var(ROOT_FOLDER_ENV_VAR, "/tmp/vidquiz-env");
        assert_eq!(
            resolve_root_folder(None, Some(&toml_root)),
            PathBuf::from("/tmp/vidquiz-env")
        );
        assert_eq!(
            resolve_root_folder(Some(Path::new("/tmp/cli")), Some(&toml_root)),
            PathBuf::from("/tmp/cli")
        );
        std::env::remove_var(ROOT_FOLDER_ENV_VAR);

        assert_eq!(resolve_root_folder(None, None), default_root_folder());
    }
}
