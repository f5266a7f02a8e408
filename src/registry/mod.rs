//! Stub registry: the seam to the request-interception mechanism
//!
//! The cassette engine never transmits bytes. It drives a [`StubRegistry`]
//! that intercepts outbound calls, serves installed stubs and reports real
//! traffic back through an observer callback.

mod memory;

pub use memory::{InMemoryRegistry, ReplayStats, StubbedRequest};

use std::sync::Arc;

use thiserror::Error;

use crate::fingerprint::MatchAttributes;
use crate::interaction::{Interaction, Method};

/// Hosts treated as loopback when the registry ignores loopback traffic
pub const LOOPBACK_ALIASES: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

/// Check whether a host is a loopback alias
#[must_use]
pub fn is_loopback_host(host: &str) -> bool {
    LOOPBACK_ALIASES.contains(&host)
}

/// Callback invoked with every real (non-stubbed) interaction
pub type RealRequestObserver = Arc<dyn Fn(&Interaction) + Send + Sync>;

/// Errors raised by a stub registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A request had no stub and real connections are disabled
    #[error(
        "Real HTTP connections are disabled. Unregistered request: {method} {uri}.  \
         You can use a cassette to record this request and replay it later."
    )]
    RealConnectionDisabled {
        /// Request method
        method: Method,
        /// Request URI
        uri: String,
    },

    /// Restore was given a checkpoint this registry does not hold
    #[error("Unknown stubs checkpoint: {0}")]
    UnknownCheckpoint(String),

    /// The live transport failed
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Opaque token returned by [`StubRegistry::checkpoint`]
///
/// Restoring consumes the token, so a checkpoint can be rolled back once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Checkpoint {
    name: String,
    id: u64,
}

impl Checkpoint {
    /// Create a token; intended for registry implementations
    #[must_use]
    pub fn new(name: impl Into<String>, id: u64) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }

    /// Name the checkpoint was taken under
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry-assigned identifier
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Interface to the process-wide request-interception mechanism
///
/// Implementations own all network interception and are shared between
/// cassettes through `Arc<dyn StubRegistry>`.
pub trait StubRegistry: Send + Sync {
    /// Whether unstubbed requests may reach the network
    fn connections_allowed(&self) -> bool;

    /// Allow or forbid unstubbed requests
    fn set_connections_allowed(&self, allowed: bool);

    /// Snapshot the currently installed stubs
    ///
    /// # Errors
    ///
    /// Implementation-defined
    fn checkpoint(&self, name: &str) -> Result<Checkpoint, RegistryError>;

    /// Reinstate exactly the stubs present when `checkpoint` was taken
    ///
    /// # Errors
    ///
    /// Returns `UnknownCheckpoint` if the token was not issued by this
    /// registry
    fn restore(&self, checkpoint: Checkpoint) -> Result<(), RegistryError>;

    /// Install interactions as stubs keyed by their fingerprint under
    /// `attributes`; responses sharing a key are served in order
    ///
    /// # Errors
    ///
    /// Implementation-defined
    fn install(
        &self,
        interactions: &[Interaction],
        attributes: &MatchAttributes,
    ) -> Result<(), RegistryError>;

    /// Whether a bodiless, headerless request would hit a stub
    fn is_stubbed(&self, method: &Method, uri: &str) -> bool;

    /// Whether loopback traffic bypasses stubbing and recording
    fn ignoring_loopback(&self) -> bool;

    /// Set whether loopback traffic bypasses stubbing and recording
    fn set_ignoring_loopback(&self, ignore: bool);

    /// Replace the real-request observer, returning the previous one
    fn set_observer(&self, observer: Option<RealRequestObserver>) -> Option<RealRequestObserver>;

    /// Run `f` with connections allowed set to `allowed`, restoring the
    /// previous value afterwards even if `f` panics
    fn with_connections_allowed<R>(&self, allowed: bool, f: impl FnOnce() -> R) -> R
    where
        Self: Sized,
    {
        struct Revert<'a, S: StubRegistry> {
            registry: &'a S,
            previous: bool,
        }

        impl<S: StubRegistry> Drop for Revert<'_, S> {
            fn drop(&mut self) {
                self.registry.set_connections_allowed(self.previous);
            }
        }

        let _revert = Revert {
            registry: self,
            previous: self.connections_allowed(),
        };
        self.set_connections_allowed(allowed);
        f()
    }
}
