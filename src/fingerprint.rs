//! Request fingerprinting under a configurable set of match attributes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::interaction::{Headers, Interaction, Method, Request, Response};
use crate::{Result, RewindError};

/// A request attribute that takes part in matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchAttribute {
    /// HTTP method, compared case-insensitively
    Method,
    /// Full request URI
    Uri,
    /// Request body, compared as an exact string
    Body,
    /// Normalized request headers
    Headers,
}

impl MatchAttribute {
    /// All attributes, in declaration order
    pub const ALL: [MatchAttribute; 4] = [
        MatchAttribute::Method,
        MatchAttribute::Uri,
        MatchAttribute::Body,
        MatchAttribute::Headers,
    ];

    /// Name used in configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MatchAttribute::Method => "method",
            MatchAttribute::Uri => "uri",
            MatchAttribute::Body => "body",
            MatchAttribute::Headers => "headers",
        }
    }
}

impl fmt::Display for MatchAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchAttribute {
    type Err = RewindError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.as_str() == s)
            .ok_or_else(|| {
                RewindError::Configuration(format!(
                    "{s} is not a valid match attribute.  Valid options are: method, uri, body, headers"
                ))
            })
    }
}

/// Ordered, non-empty, duplicate-free list of match attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<MatchAttribute>", into = "Vec<MatchAttribute>")]
pub struct MatchAttributes(Vec<MatchAttribute>);

impl MatchAttributes {
    /// Build from a list, dropping repeats
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the list is empty
    pub fn new(attributes: impl IntoIterator<Item = MatchAttribute>) -> Result<Self> {
        let mut unique = Vec::with_capacity(MatchAttribute::ALL.len());
        for attr in attributes {
            if !unique.contains(&attr) {
                unique.push(attr);
            }
        }

        if unique.is_empty() {
            return Err(RewindError::Configuration(
                "match_requests_on must name at least one attribute".to_string(),
            ));
        }

        Ok(Self(unique))
    }

    /// Check whether an attribute is selected
    #[must_use]
    pub fn contains(&self, attribute: MatchAttribute) -> bool {
        self.0.contains(&attribute)
    }

    /// Selected attributes in configured order
    #[must_use]
    pub fn as_slice(&self) -> &[MatchAttribute] {
        &self.0
    }
}

impl Default for MatchAttributes {
    fn default() -> Self {
        Self(vec![MatchAttribute::Uri, MatchAttribute::Method])
    }
}

impl TryFrom<Vec<MatchAttribute>> for MatchAttributes {
    type Error = RewindError;

    fn try_from(attributes: Vec<MatchAttribute>) -> Result<Self> {
        Self::new(attributes)
    }
}

impl From<MatchAttributes> for Vec<MatchAttribute> {
    fn from(attributes: MatchAttributes) -> Self {
        attributes.0
    }
}

/// Comparison key for a request
///
/// Only the attributes selected at construction are populated; two requests
/// are the same stubbed request iff their fingerprints are equal. The
/// fingerprint doubles as the routing key in the stub registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint {
    method: Option<Method>,
    uri: Option<String>,
    body: Option<Option<String>>,
    headers: Option<Headers>,
}

impl RequestFingerprint {
    /// Compute the fingerprint of a request
    #[must_use]
    pub fn of(request: &Request, attributes: &MatchAttributes) -> Self {
        Self {
            method: attributes
                .contains(MatchAttribute::Method)
                .then(|| request.method.clone()),
            uri: attributes
                .contains(MatchAttribute::Uri)
                .then(|| normalize_uri(&request.uri)),
            body: attributes
                .contains(MatchAttribute::Body)
                .then(|| request.body.clone()),
            headers: attributes
                .contains(MatchAttribute::Headers)
                .then(|| request.headers.clone()),
        }
    }

    /// Check whether a request produces this fingerprint
    #[must_use]
    pub fn matches(&self, request: &Request) -> bool {
        if let Some(method) = &self.method {
            if *method != request.method {
                return false;
            }
        }
        if let Some(uri) = &self.uri {
            if *uri != normalize_uri(&request.uri) {
                return false;
            }
        }
        if let Some(body) = &self.body {
            if *body != request.body {
                return false;
            }
        }
        if let Some(headers) = &self.headers {
            if *headers != request.headers {
                return false;
            }
        }
        true
    }

    /// Method constraint, if matching on method
    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// URI constraint, if matching on URI
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// SHA-256 digest of the populated attributes
    ///
    /// Each attribute is tagged and length-prefixed so that, for example, an
    /// empty body and an absent body hash differently.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();

        if let Some(method) = &self.method {
            update_field(&mut hasher, b'm', method.as_str().as_bytes());
        }

        if let Some(uri) = &self.uri {
            update_field(&mut hasher, b'u', uri.as_bytes());
        }

        match &self.body {
            Some(Some(body)) => update_field(&mut hasher, b'b', body.as_bytes()),
            Some(None) => hasher.update([b'B']),
            None => {}
        }

        if let Some(headers) = &self.headers {
            hasher.update([b'h']);
            hasher.update((headers.len() as u32).to_le_bytes());
            for (name, values) in headers.iter() {
                update_field(&mut hasher, b'n', name.as_bytes());
                hasher.update((values.len() as u32).to_le_bytes());
                for value in values {
                    update_field(&mut hasher, b'v', value.as_bytes());
                }
            }
        }

        hasher.finalize().into()
    }

    /// Short hex form of the digest for log lines
    #[must_use]
    pub fn short_hex(&self) -> String {
        hex::encode(&self.digest()[..8])
    }
}

fn update_field(hasher: &mut Sha256, tag: u8, bytes: &[u8]) {
    hasher.update([tag]);
    hasher.update((bytes.len() as u32).to_le_bytes());
    hasher.update(bytes);
}

/// Normalize a URI for comparison
///
/// URIs that parse are compared in their canonical form, so an explicit
/// default port or a missing root slash does not defeat a match. Anything
/// else is compared verbatim.
fn normalize_uri(uri: &str) -> String {
    match url::Url::parse(uri.trim()) {
        Ok(url) => url.to_string(),
        Err(_) => uri.to_string(),
    }
}

/// Group responses by fingerprint, preserving first-seen key order and
/// recording order within each group
#[must_use]
pub fn group_responses(
    interactions: &[Interaction],
    attributes: &MatchAttributes,
) -> Vec<(RequestFingerprint, Vec<Response>)> {
    let mut groups: Vec<(RequestFingerprint, Vec<Response>)> = Vec::new();

    for interaction in interactions {
        let fingerprint = RequestFingerprint::of(&interaction.request, attributes);
        match groups.iter_mut().find(|(key, _)| *key == fingerprint) {
            Some((_, responses)) => responses.push(interaction.response.clone()),
            None => groups.push((fingerprint, vec![interaction.response.clone()])),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::ResponseStatus;

    fn test_request() -> Request {
        Request::new("get", "http://example.com/api/test")
    }

    fn attrs(list: &[MatchAttribute]) -> MatchAttributes {
        MatchAttributes::new(list.iter().copied()).unwrap()
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let request = test_request();
        let attributes = MatchAttributes::default();

        let fp1 = RequestFingerprint::of(&request, &attributes);
        let fp2 = RequestFingerprint::of(&request, &attributes);

        assert_eq!(fp1, fp2, "Fingerprint must be deterministic");
        assert_eq!(fp1.digest(), fp2.digest());
    }

    #[test]
    fn test_fingerprint_different_methods() {
        let get = test_request();
        let post = Request::new("post", "http://example.com/api/test");
        let attributes = MatchAttributes::default();

        assert_ne!(
            RequestFingerprint::of(&get, &attributes),
            RequestFingerprint::of(&post, &attributes),
            "Different methods should produce different fingerprints"
        );
    }

    #[test]
    fn test_method_match_ignores_case() {
        let upper = Request::new("GET", "http://example.com/");
        let lower = Request::new("get", "http://example.com/");
        let attributes = attrs(&[MatchAttribute::Method]);

        assert!(RequestFingerprint::of(&upper, &attributes).matches(&lower));
    }

    #[test]
    fn test_unselected_attributes_ignored() {
        let first = Request::new("get", "http://example.com/uri1");
        let second = Request::new("post", "http://example.com/uri1").with_body("x");
        let attributes = attrs(&[MatchAttribute::Uri]);

        assert_eq!(
            RequestFingerprint::of(&first, &attributes),
            RequestFingerprint::of(&second, &attributes)
        );
    }

    #[test]
    fn test_header_case_insensitivity() {
        let first = test_request().with_header("X-HTTP-HEADER1", "val1");
        let second = test_request().with_header("x-http-header1", "val1");
        let attributes = attrs(&[MatchAttribute::Headers]);

        assert!(RequestFingerprint::of(&first, &attributes).matches(&second));
    }

    #[test]
    fn test_header_values_must_match() {
        let first = test_request().with_header("X-HTTP-HEADER1", "val1");
        let second = test_request().with_header("X-HTTP-HEADER1", "val3");
        let attributes = attrs(&[MatchAttribute::Headers]);

        assert!(!RequestFingerprint::of(&first, &attributes).matches(&second));
    }

    #[test]
    fn test_body_mismatch_with_same_uri() {
        let first = Request::new("post", "http://example.com/").with_body("param=val1");
        let second = Request::new("post", "http://example.com/").with_body("param=val2");
        let attributes = attrs(&[MatchAttribute::Uri, MatchAttribute::Method, MatchAttribute::Body]);

        assert!(!RequestFingerprint::of(&first, &attributes).matches(&second));
        assert_ne!(
            RequestFingerprint::of(&first, &attributes).digest(),
            RequestFingerprint::of(&second, &attributes).digest()
        );
    }

    #[test]
    fn test_body_is_not_semantic() {
        let first = Request::new("post", "http://example.com/").with_body(r#"{"a":1}"#);
        let second = Request::new("post", "http://example.com/").with_body(r#"{ "a": 1 }"#);
        let attributes = attrs(&[MatchAttribute::Body]);

        assert!(!RequestFingerprint::of(&first, &attributes).matches(&second));
    }

    #[test]
    fn test_empty_and_absent_body_differ() {
        let empty = test_request().with_body("");
        let absent = test_request();
        let attributes = attrs(&[MatchAttribute::Body]);

        assert_ne!(
            RequestFingerprint::of(&empty, &attributes).digest(),
            RequestFingerprint::of(&absent, &attributes).digest()
        );
    }

    #[test]
    fn test_uri_normalization() {
        assert_eq!(normalize_uri("http://example.com:80/"), "http://example.com/");
        assert_eq!(normalize_uri("http://example.com"), "http://example.com/");
        assert_eq!(normalize_uri("not a uri"), "not a uri");
    }

    #[test]
    fn test_match_attributes_dedup_and_empty() {
        let attributes = attrs(&[MatchAttribute::Uri, MatchAttribute::Uri, MatchAttribute::Body]);
        assert_eq!(attributes.as_slice(), &[MatchAttribute::Uri, MatchAttribute::Body]);

        assert!(MatchAttributes::new([]).is_err());
        assert_eq!(
            MatchAttributes::default().as_slice(),
            &[MatchAttribute::Uri, MatchAttribute::Method]
        );
    }

    #[test]
    fn test_match_attribute_parse() {
        assert_eq!("body".parse::<MatchAttribute>().unwrap(), MatchAttribute::Body);
        let err = "host".parse::<MatchAttribute>().unwrap_err();
        assert!(err.to_string().contains("host is not a valid match attribute"));
    }

    #[test]
    fn test_group_responses_preserves_order() {
        let ok = |body: &str| Response::new(ResponseStatus::new(200, "OK"), body);
        let interactions = vec![
            Interaction::new(Request::new("get", "http://example.com/"), ok("first")),
            Interaction::new(Request::new("get", "http://example.com/foo"), ok("foo")),
            Interaction::new(Request::new("GET", "http://example.com:80/"), ok("second")),
        ];

        let groups = group_responses(&interactions, &MatchAttributes::default());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.uri(), Some("http://example.com/"));
        let bodies: Vec<_> = groups[0].1.iter().map(|r| r.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert_eq!(groups[1].1.len(), 1);
    }
}
