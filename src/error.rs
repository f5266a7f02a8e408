//! Error types for Rewind

use std::collections::BTreeMap;
use std::io;

use thiserror::Error;

use crate::registry::RegistryError;

/// Result type for Rewind operations
pub type Result<T> = std::result::Result<T, RewindError>;

/// Errors that can occur in Rewind
#[derive(Debug, Error)]
pub enum RewindError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid cassette options or process-wide configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A cassette template references a name the context does not define
    #[error(
        "The template in the {cassette} cassette file references undefined variable {variable}.  \
         Pass it to the cassette using templating_context = {}.",
        render_context(.suggestion)
    )]
    TemplateVariableMissing {
        /// File name of the cassette being loaded
        cassette: String,
        /// Name of the undefined placeholder
        variable: String,
        /// Caller context merged with an example value for `variable`
        suggestion: BTreeMap<String, String>,
    },

    /// Cassette file written by a retired serialization scheme
    #[error(
        "The cassette {cassette} uses {} which is no longer supported.  \
         Re-record the cassette or migrate it to format version {supported}.",
        describe_version(*.found)
    )]
    UnsupportedFormat {
        /// File name of the cassette being loaded
        cassette: String,
        /// Version found in the envelope, if any
        found: Option<u64>,
        /// Version this build reads and writes
        supported: u64,
    },

    /// Cassette content could not be parsed or serialized
    #[error("Invalid cassette format: {0}")]
    InvalidFormat(String),

    /// Error raised by the stub registry, passed through unchanged
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Render a context as a TOML inline table, e.g. `{ var1 = "a" }`
pub(crate) fn render_context(context: &BTreeMap<String, String>) -> String {
    if context.is_empty() {
        return "{}".to_string();
    }

    let pairs: Vec<String> = context
        .iter()
        .map(|(key, value)| format!("{key} = {}", toml::Value::String(value.clone())))
        .collect();

    format!("{{ {} }}", pairs.join(", "))
}

fn describe_version(found: Option<u64>) -> String {
    match found {
        Some(version) => format!("format version {version}"),
        None => "an unversioned legacy format".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_context() {
        let mut context = BTreeMap::new();
        assert_eq!(render_context(&context), "{}");

        context.insert("var2".to_string(), "b".to_string());
        context.insert("var1".to_string(), "a".to_string());
        assert_eq!(render_context(&context), r#"{ var1 = "a", var2 = "b" }"#);
    }

    #[test]
    fn test_template_error_message() {
        let mut suggestion = BTreeMap::new();
        suggestion.insert("var1".to_string(), "some value".to_string());

        let err = RewindError::TemplateVariableMissing {
            cassette: "with_vars.yml".to_string(),
            variable: "var1".to_string(),
            suggestion,
        };

        assert_eq!(
            err.to_string(),
            "The template in the with_vars.yml cassette file references undefined variable var1.  \
             Pass it to the cassette using templating_context = { var1 = \"some value\" }."
        );
    }

    #[test]
    fn test_unsupported_format_names_found_version() {
        let err = RewindError::UnsupportedFormat {
            cassette: "future.yml".to_string(),
            found: Some(7),
            supported: 1,
        };
        assert!(err.to_string().contains("uses format version 7 which is no longer supported"));
    }

    #[test]
    fn test_unsupported_format_message() {
        let err = RewindError::UnsupportedFormat {
            cassette: "old.yml".to_string(),
            found: None,
            supported: 1,
        };
        let message = err.to_string();
        assert!(message.contains("old.yml"));
        assert!(message.contains("unversioned legacy format"));
        assert!(message.contains("format version 1"));
    }
}
