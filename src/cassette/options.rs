//! Per-cassette options and their merge with process-wide defaults

use serde::{Deserialize, Serialize};

use super::RecordMode;
use crate::fingerprint::MatchAttributes;
use crate::template::TemplateContext;
use crate::{Result, RewindError};

/// Templating switch: a flag, or a context of named values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Templating {
    /// `true` enables templating with an empty context
    Enabled(bool),
    /// Enable templating with these values
    Context(TemplateContext),
}

/// Options accepted when opening a cassette
///
/// Every field is optional; unset fields fall back to the process-wide
/// defaults in [`Config`](crate::config::Config) and then to built-in
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CassetteOptions {
    /// Record mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<RecordMode>,
    /// Attributes that decide whether two requests are the same
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_requests_on: Option<MatchAttributes>,
    /// Placeholder expansion for the cassette file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templating_context: Option<Templating>,
    /// Explicit override of the registry's connections-allowed flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_real_requests: Option<bool>,
}

impl CassetteOptions {
    /// Empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a TOML table
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown keys or invalid values
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RewindError::Configuration(format!("Invalid cassette options: {e}")))
    }

    /// Set the record mode
    #[must_use]
    pub fn record(mut self, mode: RecordMode) -> Self {
        self.record = Some(mode);
        self
    }

    /// Set the match attributes
    #[must_use]
    pub fn match_requests_on(mut self, attributes: MatchAttributes) -> Self {
        self.match_requests_on = Some(attributes);
        self
    }

    /// Enable templating with `context`
    #[must_use]
    pub fn templating_context(mut self, context: TemplateContext) -> Self {
        self.templating_context = Some(Templating::Context(context));
        self
    }

    /// Enable or disable templating without a context
    #[must_use]
    pub fn templating(mut self, enabled: bool) -> Self {
        self.templating_context = Some(Templating::Enabled(enabled));
        self
    }

    /// Override whether real requests are allowed while open
    #[must_use]
    pub fn allow_real_requests(mut self, allowed: bool) -> Self {
        self.allow_real_requests = Some(allowed);
        self
    }

    /// Layer these options over `defaults`; set fields win
    #[must_use]
    pub fn merged_over(&self, defaults: &CassetteOptions) -> CassetteOptions {
        CassetteOptions {
            record: self.record.or(defaults.record),
            match_requests_on: self
                .match_requests_on
                .clone()
                .or_else(|| defaults.match_requests_on.clone()),
            templating_context: self
                .templating_context
                .clone()
                .or_else(|| defaults.templating_context.clone()),
            allow_real_requests: self.allow_real_requests.or(defaults.allow_real_requests),
        }
    }

    /// Fill unset fields with built-in defaults
    #[must_use]
    pub fn resolve(&self) -> ResolvedOptions {
        let templating = match &self.templating_context {
            None | Some(Templating::Enabled(false)) => None,
            Some(Templating::Enabled(true)) => Some(TemplateContext::new()),
            Some(Templating::Context(context)) => Some(context.clone()),
        };

        ResolvedOptions {
            record: self.record.unwrap_or_default(),
            match_requests_on: self.match_requests_on.clone().unwrap_or_default(),
            templating,
            allow_real_requests: self.allow_real_requests,
        }
    }
}

/// Fully resolved cassette options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    /// Record mode
    pub record: RecordMode,
    /// Match attributes
    pub match_requests_on: MatchAttributes,
    /// Templating context, `None` when templating is off
    pub templating: Option<TemplateContext>,
    /// Explicit connections-allowed override
    pub allow_real_requests: Option<bool>,
}

impl ResolvedOptions {
    /// Value for the registry's connections-allowed flag while open
    #[must_use]
    pub fn connections_allowed(&self) -> bool {
        self.allow_real_requests
            .unwrap_or_else(|| self.record.allows_real_requests())
    }
}
