//! Versioned cassette envelope

use serde::{Deserialize, Serialize};

use crate::interaction::Interaction;
use crate::{Result, RewindError};

/// Current envelope version
pub const FORMAT_VERSION: u64 = 1;

/// Name of the envelope's version key
const VERSION_KEY: &str = "format_version";

/// On-disk cassette document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CassetteFile {
    /// Envelope version, always `FORMAT_VERSION` when written
    pub format_version: u64,
    /// Recorded interactions in recording order
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl CassetteFile {
    /// Wrap interactions in a current-version envelope
    #[must_use]
    pub fn new(interactions: Vec<Interaction>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            interactions,
        }
    }
}

/// Parse cassette content into interactions
///
/// The version is checked before the payload is interpreted, so content
/// written by a retired scheme reports `UnsupportedFormat` instead of a
/// generic parse error. An empty document is an empty cassette.
///
/// # Errors
///
/// Returns `InvalidFormat` for malformed content and `UnsupportedFormat` for
/// a missing or unknown envelope version
pub fn decode(cassette: &str, content: &str) -> Result<Vec<Interaction>> {
    let document: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| RewindError::InvalidFormat(format!("{cassette}: {e}")))?;

    if document.is_null() {
        return Ok(Vec::new());
    }

    let version = document
        .as_mapping()
        .and_then(|mapping| mapping.get(VERSION_KEY))
        .map(|value| {
            value.as_u64().ok_or_else(|| {
                RewindError::InvalidFormat(format!(
                    "{cassette}: {VERSION_KEY} must be a non-negative integer"
                ))
            })
        })
        .transpose()?;

    match version {
        Some(FORMAT_VERSION) => {}
        found => {
            return Err(RewindError::UnsupportedFormat {
                cassette: cassette.to_string(),
                found,
                supported: FORMAT_VERSION,
            })
        }
    }

    let file: CassetteFile = serde_yaml::from_value(document)
        .map_err(|e| RewindError::InvalidFormat(format!("{cassette}: {e}")))?;

    Ok(file.interactions)
}

/// Serialize interactions into a current-version envelope
///
/// # Errors
///
/// Returns `InvalidFormat` if serialization fails
pub fn encode(interactions: &[Interaction]) -> Result<String> {
    let file = CassetteFile::new(interactions.to_vec());
    serde_yaml::to_string(&file).map_err(|e| RewindError::InvalidFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{Request, Response, ResponseStatus};

    fn sample() -> Vec<Interaction> {
        vec![
            Interaction::new(
                Request::new("get", "http://example.com/").with_header("Accept", "*/*"),
                Response::new(ResponseStatus::new(200, "OK"), "line one\nline two\n")
                    .with_header("Set-Cookie", "a=1")
                    .with_header("Set-Cookie", "b=2"),
            ),
            Interaction::new(
                Request::new("post", "http://example.com/form").with_body("id=7"),
                Response::new(ResponseStatus::new(404, "Not Found"), "  <html>  "),
            ),
        ]
    }

    #[test]
    fn test_encode_then_decode() {
        let interactions = sample();
        let content = encode(&interactions).unwrap();

        assert!(content.starts_with("format_version: 1\n"));
        assert_eq!(decode("sample.yml", &content).unwrap(), interactions);
    }

    #[test]
    fn test_encode_is_stable() {
        let content = encode(&sample()).unwrap();
        let again = encode(&decode("sample.yml", &content).unwrap()).unwrap();
        assert_eq!(content, again);
    }

    #[test]
    fn test_empty_document() {
        assert!(decode("empty.yml", "").unwrap().is_empty());
        assert!(decode("empty.yml", "format_version: 1\n").unwrap().is_empty());
    }

    #[test]
    fn test_unversioned_document_is_unsupported() {
        let legacy = "- request:\n    method: get\n    uri: http://example.com/\n";
        let err = decode("0_3_1_cassette.yml", legacy).unwrap_err();

        assert!(matches!(
            err,
            RewindError::UnsupportedFormat { found: None, supported: 1, .. }
        ));
        assert!(err.to_string().contains("0_3_1_cassette.yml"));
    }

    #[test]
    fn test_future_version_is_unsupported() {
        let err = decode("next.yml", "format_version: 2\ninteractions: []\n").unwrap_err();
        assert!(matches!(
            err,
            RewindError::UnsupportedFormat { found: Some(2), .. }
        ));
    }

    #[test]
    fn test_malformed_content_is_invalid() {
        let err = decode("bad.yml", "format_version: 1\ninteractions: [ {").unwrap_err();
        assert!(matches!(err, RewindError::InvalidFormat(_)));

        let err = decode("bad.yml", "format_version: one\n").unwrap_err();
        assert!(matches!(err, RewindError::InvalidFormat(_)));

        let err = decode("bad.yml", "format_version: 1\ninteractions:\n  - request: 3\n")
            .unwrap_err();
        assert!(matches!(err, RewindError::InvalidFormat(_)));
    }
}
