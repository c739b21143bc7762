//! Application configuration.
//!
//! Settings are read from an optional `click_capture.json` next to the
//! executable. The file is never written by the program; when it is absent
//! every field takes its default. The trigger gesture and the poll cadence are
//! fixed and have no setting here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::mode::CaptureMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Complete application configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Mode active at startup
    pub default_mode: CaptureMode,
    /// Save directory override. Relative paths resolve against the exe directory.
    pub output_dir: Option<PathBuf>,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_mode: CaptureMode::default(),
            output_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Resolves the save directory. `default_dir` is used when no override is
    /// set; a relative override is joined onto `base`.
    pub fn resolve_output_dir(&self, base: &Path, default_dir: PathBuf) -> PathBuf {
        match &self.output_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base.join(dir),
            None => default_dir,
        }
    }
}

/// Loads the configuration at `path`.
///
/// A missing file is not an error and yields the defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(AppConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
