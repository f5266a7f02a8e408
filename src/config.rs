//! Process-wide configuration for Rewind

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cassette::CassetteOptions;
use crate::{Result, RewindError};

/// Main configuration
///
/// Without a library directory cassettes live in memory only: nothing is
/// loaded and nothing is written at eject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding cassette files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cassette_library_dir: Option<PathBuf>,
    /// Options applied to every cassette unless overridden when opening it
    #[serde(default)]
    pub default_cassette_options: CassetteOptions,
}

impl Config {
    /// Configuration with cassettes kept in memory
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Set the cassette library directory
    #[must_use]
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cassette_library_dir = Some(dir.into());
        self
    }

    /// Set the default cassette options
    #[must_use]
    pub fn with_default_options(mut self, options: CassetteOptions) -> Self {
        self.default_cassette_options = options;
        self
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RewindError::Configuration(format!("Failed to read config file: {e}"))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns error for unknown keys, invalid option values or a failed
    /// [`Config::validate`]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RewindError::Configuration(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// A library directory that does not exist yet is fine; it is created
    /// on the first write.
    ///
    /// # Errors
    ///
    /// Returns error if the library path exists but is not a directory
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.cassette_library_dir {
            if dir.as_os_str().is_empty() {
                return Err(RewindError::Configuration(
                    "cassette_library_dir cannot be empty".to_string(),
                ));
            }

            if dir.exists() && !dir.is_dir() {
                return Err(RewindError::Configuration(format!(
                    "Cassette library path is not a directory: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }
}
