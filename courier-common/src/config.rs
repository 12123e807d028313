//! RON configuration loading.
//!
//! Configuration files are located with the following precedence:
//! 1. An explicit path (e.g. from a command line flag)
//! 2. The environment variable named by the caller
//! 3. Each of the caller's default paths, in order

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid RON for the expected shape.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    /// An explicitly named file does not exist.
    #[error("Config file does not exist: {0}")]
    Missing(PathBuf),

    /// Nothing was found in any of the searched locations.
    #[error("No configuration file found. Tried:\n{0}")]
    NotFound(String),
}

/// Find the configuration file.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] if an explicit path or the environment
/// variable names a file that does not exist, and [`ConfigError::NotFound`]
/// if none of the default locations exist.
pub fn find_config_file(
    explicit: Option<&Path>,
    env_var: &str,
    defaults: &[PathBuf],
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(ConfigError::Missing(path.to_path_buf()))
        };
    }

    if let Ok(env_path) = std::env::var(env_var) {
        let path = PathBuf::from(env_path);
        return if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::Missing(path))
        };
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = std::iter::once(format!("  - {env_var} environment variable"))
        .chain(defaults.iter().map(|p| format!("  - {}", p.display())))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::NotFound(paths_tried))
}

/// Read and deserialize a RON configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    ron::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
