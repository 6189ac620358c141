//! Relay configuration.
//!
//! Loaded from JSON (camelCase keys); every field has a default so an
//! empty object is a valid config:
//!
//! ```json
//! { "threads": 8, "partSize": 524288, "dryRun": false, "tempDir": "/var/tmp" }
//! ```

use std::path::{Path, PathBuf};

use mediarelay_transfer::{DEFAULT_PART_SIZE, validate_part_size};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default ceiling on concurrent parts per relay.
pub const DEFAULT_THREADS: usize = 4;

/// Settings shared by every clone invocation of a [`Forwarder`](crate::Forwarder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForwarderConfig {
    /// Maximum parts in flight; smaller objects use fewer.
    pub threads: usize,
    /// Part size in bytes for both download and upload.
    pub part_size: usize,
    /// Report completion without transferring anything.
    pub dry_run: bool,
    /// Directory for staging files (system temp dir when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            part_size: DEFAULT_PART_SIZE,
            dry_run: false,
            temp_dir: None,
        }
    }
}

impl ForwarderConfig {
    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }
        validate_part_size(self.part_size).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(dir) = &self.temp_dir
            && !dir.is_dir()
        {
            return Err(ConfigError::Invalid(format!(
                "temp dir is not a directory: {}",
                dir.display()
            )));
        }
        Ok(())
    }
}
