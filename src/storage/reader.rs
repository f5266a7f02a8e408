//! Cassette file reader

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::interaction::Interaction;
use crate::template::{TemplateContext, TemplateResolver};
use crate::Result;

/// Reads and decodes one cassette file
#[derive(Debug, Clone)]
pub struct CassetteReader {
    path: PathBuf,
    display_name: String,
}

impl CassetteReader {
    /// Create a reader for `path`
    ///
    /// `display_name` identifies the cassette in error messages, typically
    /// its sanitized file name.
    pub fn new(path: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
        }
    }

    /// Path being read
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw file content, or `None` when the file does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read
    pub fn read_raw(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load interactions, resolving placeholders first when a templating
    /// context is given
    ///
    /// A missing file yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, a placeholder is undefined,
    /// or the content cannot be decoded
    pub fn load(&self, templating: Option<&TemplateContext>) -> Result<Vec<Interaction>> {
        let Some(raw) = self.read_raw()? else {
            debug!("No cassette file at {}", self.path.display());
            return Ok(Vec::new());
        };

        let content = match templating {
            Some(context) => TemplateResolver::new(context).resolve(&self.display_name, &raw)?,
            None => raw,
        };

        let interactions = super::decode(&self.display_name, &content)?;

        debug!(
            "Read {} interactions from {}",
            interactions.len(),
            self.path.display()
        );

        Ok(interactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{Request, Response, ResponseStatus};
    use crate::storage::encode;
    use crate::RewindError;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let reader = CassetteReader::new(temp_dir.path().join("absent.yml"), "absent.yml");

        assert!(reader.read_raw().unwrap().is_none());
        assert!(reader.load(None).unwrap().is_empty());
    }

    #[test]
    fn test_load_plain() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.yml");
        let interactions = vec![Interaction::new(
            Request::new("get", "http://example.com/"),
            Response::new(ResponseStatus::new(200, "OK"), "sum: {{ total }}"),
        )];
        fs::write(&path, encode(&interactions).unwrap()).unwrap();

        let reader = CassetteReader::new(&path, "plain.yml");

        // Without templating the placeholder is kept verbatim
        let loaded = reader.load(None).unwrap();
        assert_eq!(loaded[0].response.body, "sum: {{ total }}");

        let mut context = TemplateContext::new();
        context.insert("total".to_string(), "3".to_string());
        let loaded = reader.load(Some(&context)).unwrap();
        assert_eq!(loaded[0].response.body, "sum: 3");
    }

    #[test]
    fn test_template_error_names_cassette() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vars.yml");
        fs::write(&path, "format_version: 1\ninteractions: []\n# {{ var1 }}\n").unwrap();

        let err = CassetteReader::new(&path, "vars.yml")
            .load(Some(&TemplateContext::new()))
            .unwrap_err();

        assert!(matches!(
            err,
            RewindError::TemplateVariableMissing { ref cassette, .. } if cassette == "vars.yml"
        ));
    }
}
