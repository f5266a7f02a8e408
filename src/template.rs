//! Placeholder expansion for parameterized cassette files
//!
//! Cassette content may contain `{{ name }}` placeholders. When templating is
//! enabled for a cassette, each placeholder is replaced by the value bound to
//! `name` in the templating context before the content is parsed.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::{Result, RewindError};

/// Example value suggested for an undefined placeholder
pub const EXAMPLE_VALUE: &str = "some value";

/// Named values available to placeholders
pub type TemplateContext = BTreeMap<String, String>;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
            .expect("placeholder pattern is valid")
    })
}

/// Expands placeholders against a fixed context
#[derive(Debug, Clone)]
pub struct TemplateResolver<'a> {
    context: &'a TemplateContext,
}

impl<'a> TemplateResolver<'a> {
    /// Create a resolver over `context`
    #[must_use]
    pub fn new(context: &'a TemplateContext) -> Self {
        Self { context }
    }

    /// Replace every placeholder in `content`
    ///
    /// `cassette` names the file being resolved and only appears in errors.
    ///
    /// # Errors
    ///
    /// Returns `TemplateVariableMissing` for the first placeholder, in
    /// document order, whose name the context does not define
    pub fn resolve(&self, cassette: &str, content: &str) -> Result<String> {
        let pattern = placeholder_pattern();

        if let Some(missing) = pattern
            .captures_iter(content)
            .map(|caps| caps[1].to_string())
            .find(|name| !self.context.contains_key(name))
        {
            let mut suggestion = self.context.clone();
            suggestion.insert(missing.clone(), EXAMPLE_VALUE.to_string());

            return Err(RewindError::TemplateVariableMissing {
                cassette: cassette.to_string(),
                variable: missing,
                suggestion,
            });
        }

        let resolved = pattern.replace_all(content, |caps: &Captures<'_>| {
            self.context
                .get(&caps[1])
                .cloned()
                .unwrap_or_default()
        });

        Ok(resolved.into_owned())
    }
}
