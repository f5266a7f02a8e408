//! Cassette lifecycle: load, install, record and persist interactions

mod options;
mod session;
mod store;

pub use options::{CassetteOptions, ResolvedOptions, Templating};
pub use session::{Cassette, CassetteState};
pub use store::{without_loopback, InteractionSink, InteractionStore};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::registry::StubRegistry;
use crate::{Result, RewindError};

/// Policy for live traffic while a cassette is open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordMode {
    /// Ignore the cassette file; record every request
    All,
    /// Replay only; unstubbed requests fail
    None,
    /// Replay known requests; record the rest
    #[default]
    NewEpisodes,
}

impl RecordMode {
    /// Every record mode
    pub const VALID: [RecordMode; 3] = [RecordMode::All, RecordMode::None, RecordMode::NewEpisodes];

    /// Name used in configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecordMode::All => "all",
            RecordMode::None => "none",
            RecordMode::NewEpisodes => "new_episodes",
        }
    }

    /// Whether this mode lets unstubbed requests reach the network
    #[must_use]
    pub fn allows_real_requests(self) -> bool {
        !matches!(self, RecordMode::None)
    }

    /// Whether previously recorded interactions are loaded and replayed
    #[must_use]
    pub fn loads_interactions(self) -> bool {
        !matches!(self, RecordMode::All)
    }
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordMode {
    type Err = RewindError;

    fn from_str(s: &str) -> Result<Self> {
        Self::VALID
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::VALID.iter().map(|m| m.as_str()).collect();
                RewindError::Configuration(format!(
                    "{s} is not a valid cassette record mode.  Valid options are: {}",
                    valid.join(", ")
                ))
            })
    }
}

impl TryFrom<String> for RecordMode {
    type Error = RewindError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<RecordMode> for String {
    fn from(mode: RecordMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Open a cassette, run `f`, then eject
///
/// # Errors
///
/// Returns error if the cassette cannot be opened or ejected; `f`'s value is
/// discarded in that case
pub fn use_cassette<R>(
    name: &str,
    options: CassetteOptions,
    config: &Config,
    registry: Arc<dyn StubRegistry>,
    f: impl FnOnce(&Cassette) -> R,
) -> Result<R> {
    let cassette = Cassette::open(name, options, config, registry)?;
    let value = f(&cassette);
    cassette.eject()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_mode_parse() {
        assert_eq!("all".parse::<RecordMode>().unwrap(), RecordMode::All);
        assert_eq!("none".parse::<RecordMode>().unwrap(), RecordMode::None);
        assert_eq!(
            "new_episodes".parse::<RecordMode>().unwrap(),
            RecordMode::NewEpisodes
        );
    }

    #[test]
    fn test_invalid_record_mode_lists_valid_set() {
        let err = "not_a_record_mode".parse::<RecordMode>().unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, RewindError::Configuration(_)));
        assert!(message.contains("not_a_record_mode is not a valid cassette record mode"));
        assert!(message.contains("all, none, new_episodes"));
    }

    #[test]
    fn test_use_cassette_restores_registry_on_panic() {
        use crate::interaction::{Interaction, Method, Request, Response, ResponseStatus};
        use crate::registry::InMemoryRegistry;
        use std::panic::{self, AssertUnwindSafe};
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let recorded = [Interaction::new(
            Request::new("get", "http://example.com/"),
            Response::new(ResponseStatus::new(200, "OK"), "hello"),
        )];
        std::fs::write(
            temp_dir.path().join("panicking.yml"),
            crate::storage::encode(&recorded).unwrap(),
        )
        .unwrap();
        let config = Config::in_memory().with_library_dir(temp_dir.path());

        let registry = Arc::new(InMemoryRegistry::new());
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            use_cassette(
                "panicking",
                CassetteOptions::new().record(RecordMode::None),
                &config,
                registry.clone(),
                |cassette| {
                    cassette.record(Interaction::new(
                        Request::new("get", "http://example.com/new"),
                        Response::new(ResponseStatus::new(200, "OK"), "new"),
                    ));
                    panic!("assertion failed inside cassette");
                },
            )
        }));

        assert!(result.is_err());
        assert!(registry.connections_allowed());
        assert!(!registry.is_stubbed(&Method::Get, "http://example.com/"));
        assert_eq!(registry.pending_checkpoints(), 0);
        assert!(registry.set_observer(None).is_none());

        let reloaded = crate::storage::CassetteReader::new(
            temp_dir.path().join("panicking.yml"),
            "panicking.yml",
        )
        .load(None)
        .unwrap();
        assert_eq!(reloaded, recorded);
    }

    #[test]
    fn test_record_mode_policies() {
        for mode in RecordMode::VALID {
            assert_eq!(mode.allows_real_requests(), mode != RecordMode::None);
            assert_eq!(mode.loads_interactions(), mode != RecordMode::All);
        }
    }
}
