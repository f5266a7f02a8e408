//! Cassette file writer

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::interaction::Interaction;
use crate::Result;

/// Writes a full interaction sequence to one cassette file
#[derive(Debug, Clone)]
pub struct CassetteWriter {
    path: PathBuf,
}

impl CassetteWriter {
    /// Create a writer for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path being written
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file with `interactions`, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails or the file cannot be written
    pub fn write(&self, interactions: &[Interaction]) -> Result<()> {
        let content = super::encode(interactions)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&self.path, content)?;

        debug!(
            "Wrote {} interactions to {}",
            interactions.len(),
            self.path.display()
        );

        Ok(())
    }
}
