//! Recorded HTTP request/response pairs

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// HTTP method
///
/// Parsing ignores case, so `"GET"`, `"get"` and `"Get"` are the same method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
    /// Any other method, stored lowercase
    Other(String),
}

impl Method {
    /// Lowercase name as written to cassettes
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Patch => "patch",
            Method::Delete => "delete",
            Method::Head => "head",
            Method::Options => "options",
            Method::Other(name) => name,
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "get" => Method::Get,
            "post" => Method::Post,
            "put" => Method::Put,
            "patch" => Method::Patch,
            "delete" => Method::Delete,
            "head" => Method::Head,
            "options" => Method::Options,
            _ => Method::Other(lower),
        }
    }
}

impl From<String> for Method {
    fn from(name: String) -> Self {
        Method::from(name.as_str())
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.as_str().to_string()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

/// Normalized header map: lowercase names, each mapped to its ordered values
///
/// A header given without a value is kept as an empty sequence rather than
/// dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    /// Create an empty header map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, value)` pairs, folding repeated names together
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            headers.append(name.as_ref(), value);
        }
        headers
    }

    /// Append a value, creating the entry if needed
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Set all values for a header; `None` records the name with no values
    pub fn insert(&mut self, name: &str, values: Option<Vec<String>>) {
        self.0
            .insert(name.to_ascii_lowercase(), values.unwrap_or_default());
    }

    /// Values for a header, looked up case-insensitively
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// Iterate over `(name, values)` in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct header names
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no headers are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Null maps and null values both collapse to empty; names differing
        // only in case fold together like `append`
        let raw = Option::<BTreeMap<String, Option<Vec<String>>>>::deserialize(deserializer)?;
        let mut headers = Headers::new();
        for (name, values) in raw.unwrap_or_default() {
            headers
                .0
                .entry(name.to_ascii_lowercase())
                .or_default()
                .extend(values.unwrap_or_default());
        }
        Ok(headers)
    }
}

/// Recorded HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Full request URI
    pub uri: String,
    /// Request body, if any
    #[serde(default)]
    pub body: Option<String>,
    /// Normalized request headers
    #[serde(default)]
    pub headers: Headers,
}

impl Request {
    /// Create a request without body or headers
    pub fn new(method: impl Into<Method>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            body: None,
            headers: Headers::new(),
        }
    }

    /// Attach a body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Append a header value
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Host component of the URI, if it parses as a URL
    #[must_use]
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.uri)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

/// Response status line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseStatus {
    /// Numeric status code
    pub code: u16,
    /// Reason phrase
    pub message: String,
}

impl ResponseStatus {
    /// Create a status
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Recorded HTTP response
///
/// The body is always kept as the raw string received so it survives a trip
/// through the cassette file byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Response {
    /// Status line
    pub status: ResponseStatus,
    /// Normalized response headers
    #[serde(default)]
    pub headers: Headers,
    /// Raw response body
    #[serde(default)]
    pub body: String,
    /// Protocol version, e.g. `1.1`
    pub http_version: String,
}

impl Response {
    /// Create an HTTP/1.1 response without headers
    pub fn new(status: ResponseStatus, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
            http_version: "1.1".to_string(),
        }
    }

    /// Append a header value
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// One request paired with the response it received
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interaction {
    /// The request
    pub request: Request,
    /// The response
    pub response: Response,
}

impl Interaction {
    /// Pair a request with its response
    #[must_use]
    pub fn new(request: Request, response: Response) -> Self {
        Self { request, response }
    }
}
