//! In-process stub registry
//!
//! Serves installed stubs to requests handed to [`InMemoryRegistry::handle`]
//! and forwards everything else to a caller-supplied transport, reporting
//! real traffic to the registered observer.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use tracing::{debug, warn};

use super::{
    is_loopback_host, Checkpoint, RealRequestObserver, RegistryError, StubRegistry,
};
use crate::fingerprint::{group_responses, MatchAttributes, RequestFingerprint};
use crate::interaction::{Interaction, Method, Request, Response};

/// One stubbed request and the responses recorded for it
///
/// The Nth matching request receives the Nth response; once the sequence is
/// exhausted the last response is repeated.
#[derive(Debug)]
pub struct StubbedRequest {
    fingerprint: RequestFingerprint,
    responses: Vec<Response>,
    served: AtomicUsize,
}

impl StubbedRequest {
    fn new(fingerprint: RequestFingerprint, responses: Vec<Response>) -> Self {
        Self {
            fingerprint,
            responses,
            served: AtomicUsize::new(0),
        }
    }

    /// Routing key
    #[must_use]
    pub fn fingerprint(&self) -> &RequestFingerprint {
        &self.fingerprint
    }

    /// Responses in recording order
    #[must_use]
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    /// Next response in the sequence, clamped to the last
    pub fn next_response(&self) -> Option<Response> {
        let served = self
            .served
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_add(1))
            })
            .unwrap_or_else(|n| n);

        self.responses
            .get(served)
            .or_else(|| self.responses.last())
            .cloned()
    }
}

/// Replay statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Requests answered from a stub
    pub hits: usize,
    /// Requests with no matching stub
    pub misses: usize,
    /// Installed stubs
    pub stubs: usize,
}

/// Stub registry that lives entirely in process memory
pub struct InMemoryRegistry {
    connections_allowed: AtomicBool,
    ignoring_loopback: AtomicBool,
    stubs: RwLock<Vec<Arc<StubbedRequest>>>,
    checkpoints: DashMap<u64, Vec<Arc<StubbedRequest>>>,
    next_checkpoint: AtomicU64,
    observer: RwLock<Option<RealRequestObserver>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

static_assertions::assert_impl_all!(InMemoryRegistry: Send, Sync);

impl InMemoryRegistry {
    /// Create a registry with no stubs that allows real connections
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections_allowed: AtomicBool::new(true),
            ignoring_loopback: AtomicBool::new(false),
            stubs: RwLock::new(Vec::new()),
            checkpoints: DashMap::new(),
            next_checkpoint: AtomicU64::new(0),
            observer: RwLock::new(None),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Intercept a request
    ///
    /// A matching stub answers first, newest install winning. Otherwise
    /// loopback requests go straight to `live` when loopback is ignored,
    /// and other requests go to `live` only when connections are allowed,
    /// in which case the observer sees the resulting interaction.
    ///
    /// # Errors
    ///
    /// Returns `RealConnectionDisabled` for an unstubbed request while
    /// connections are forbidden, or whatever `live` returns
    pub fn handle<F>(&self, request: &Request, live: F) -> Result<Response, RegistryError>
    where
        F: FnOnce(&Request) -> Result<Response, RegistryError>,
    {
        if let Some(response) = self.find_stub(request).and_then(|s| s.next_response()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Stub hit: {} {} -> {}",
                request.method, request.uri, response.status.code
            );
            return Ok(response);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        if self.ignoring_loopback() && request.host().is_some_and(|h| is_loopback_host(&h)) {
            debug!("Passing loopback request through: {} {}", request.method, request.uri);
            return live(request);
        }

        if !self.connections_allowed() {
            warn!("No stub found: {} {}", request.method, request.uri);
            return Err(RegistryError::RealConnectionDisabled {
                method: request.method.clone(),
                uri: request.uri.clone(),
            });
        }

        let response = live(request)?;
        let interaction = Interaction::new(request.clone(), response.clone());

        let observer = self.observer_guard().clone();
        if let Some(observer) = observer {
            observer(&interaction);
        }

        Ok(response)
    }

    /// Replay statistics
    #[must_use]
    pub fn stats(&self) -> ReplayStats {
        ReplayStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stubs: self.read_stubs().len(),
        }
    }

    /// Number of checkpoints not yet restored
    #[must_use]
    pub fn pending_checkpoints(&self) -> usize {
        self.checkpoints.len()
    }

    fn find_stub(&self, request: &Request) -> Option<Arc<StubbedRequest>> {
        self.read_stubs()
            .iter()
            .rev()
            .find(|stub| stub.fingerprint.matches(request))
            .cloned()
    }

    fn read_stubs(&self) -> RwLockReadGuard<'_, Vec<Arc<StubbedRequest>>> {
        self.stubs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_stubs(&self) -> RwLockWriteGuard<'_, Vec<Arc<StubbedRequest>>> {
        self.stubs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn observer_guard(&self) -> RwLockReadGuard<'_, Option<RealRequestObserver>> {
        self.observer.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StubRegistry for InMemoryRegistry {
    fn connections_allowed(&self) -> bool {
        self.connections_allowed.load(Ordering::SeqCst)
    }

    fn set_connections_allowed(&self, allowed: bool) {
        self.connections_allowed.store(allowed, Ordering::SeqCst);
    }

    fn checkpoint(&self, name: &str) -> Result<Checkpoint, RegistryError> {
        let id = self.next_checkpoint.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.read_stubs().clone();

        debug!("Checkpoint '{}' ({}) holds {} stubs", name, id, snapshot.len());
        self.checkpoints.insert(id, snapshot);

        Ok(Checkpoint::new(name, id))
    }

    fn restore(&self, checkpoint: Checkpoint) -> Result<(), RegistryError> {
        let (_, snapshot) = self
            .checkpoints
            .remove(&checkpoint.id())
            .ok_or_else(|| RegistryError::UnknownCheckpoint(checkpoint.name().to_string()))?;

        debug!(
            "Restoring checkpoint '{}' ({} stubs)",
            checkpoint.name(),
            snapshot.len()
        );
        *self.write_stubs() = snapshot;

        Ok(())
    }

    fn install(
        &self,
        interactions: &[Interaction],
        attributes: &MatchAttributes,
    ) -> Result<(), RegistryError> {
        let groups = group_responses(interactions, attributes);
        let count = groups.len();

        let mut stubs = self.write_stubs();
        stubs.extend(
            groups
                .into_iter()
                .map(|(fingerprint, responses)| Arc::new(StubbedRequest::new(fingerprint, responses))),
        );
        drop(stubs);

        debug!(
            "Installed {} stubs from {} interactions",
            count,
            interactions.len()
        );

        Ok(())
    }

    fn is_stubbed(&self, method: &Method, uri: &str) -> bool {
        self.find_stub(&Request::new(method.clone(), uri)).is_some()
    }

    fn ignoring_loopback(&self) -> bool {
        self.ignoring_loopback.load(Ordering::SeqCst)
    }

    fn set_ignoring_loopback(&self, ignore: bool) {
        self.ignoring_loopback.store(ignore, Ordering::SeqCst);
    }

    fn set_observer(&self, observer: Option<RealRequestObserver>) -> Option<RealRequestObserver> {
        let mut guard = self.observer.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, observer)
    }
}
