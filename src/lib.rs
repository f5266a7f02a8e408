//! Rewind - record HTTP interactions once, replay them in tests
//!
//! A cassette is a named file of recorded request/response pairs. Opening
//! one installs its interactions as stubs on a [`registry::StubRegistry`];
//! real requests made while it is open are appended, and ejecting it writes
//! any new interactions back.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod cassette;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod interaction;
pub mod registry;
pub mod storage;
pub mod template;

pub use cassette::{use_cassette, Cassette, CassetteOptions, RecordMode};
pub use config::Config;
pub use error::{Result, RewindError};
pub use fingerprint::{MatchAttribute, MatchAttributes, RequestFingerprint};
pub use interaction::{Headers, Interaction, Method, Request, Response, ResponseStatus};
pub use registry::{InMemoryRegistry, RegistryError, StubRegistry};

/// Library version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Version of this build, from the package manifest
#[must_use]
pub fn version() -> Version {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split(['.', '-', '+'])
        .map(|part| part.parse().unwrap_or(0));

    Version {
        major: parts.next().unwrap_or(0),
        minor: parts.next().unwrap_or(0),
        patch: parts.next().unwrap_or(0),
    }
}
