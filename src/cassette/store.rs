//! Interaction store for one cassette

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::fingerprint::{MatchAttributes, RequestFingerprint};
use crate::interaction::Interaction;
use crate::registry::is_loopback_host;

/// Live interactions plus the snapshot taken at load time
///
/// The live sequence is shared with [`InteractionSink`] handles so the
/// registry's observer can append to it.
#[derive(Debug, Default)]
pub struct InteractionStore {
    live: Arc<Mutex<Vec<Interaction>>>,
    loaded: Vec<Interaction>,
}

impl InteractionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with interactions read from persistence
    pub fn load(&mut self, interactions: Vec<Interaction>) {
        *lock(&self.live) = interactions.clone();
        self.loaded = interactions;
    }

    /// Append an interaction
    pub fn record(&self, interaction: Interaction) {
        lock(&self.live).push(interaction);
    }

    /// Handle that appends to this store
    #[must_use]
    pub fn sink(&self) -> InteractionSink {
        InteractionSink {
            live: Arc::clone(&self.live),
        }
    }

    /// Snapshot of the live sequence
    #[must_use]
    pub fn interactions(&self) -> Vec<Interaction> {
        lock(&self.live).clone()
    }

    /// Interactions present at load time
    #[must_use]
    pub fn loaded(&self) -> &[Interaction] {
        &self.loaded
    }

    /// Number of live interactions
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.live).len()
    }

    /// True when nothing has been loaded or recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.live).is_empty()
    }

    /// Live interactions not accounted for by the loaded snapshot
    ///
    /// Each loaded interaction cancels at most one equal live entry, so a
    /// request recorded again after loading is still reported as new.
    #[must_use]
    pub fn new_interactions(&self) -> Vec<Interaction> {
        let mut unmatched: Vec<&Interaction> = self.loaded.iter().collect();
        let live = lock(&self.live);

        live.iter()
            .filter(|interaction| {
                match unmatched.iter().position(|loaded| loaded == interaction) {
                    Some(index) => {
                        unmatched.swap_remove(index);
                        false
                    }
                    None => true,
                }
            })
            .cloned()
            .collect()
    }
}

/// Cloneable handle for appending to an [`InteractionStore`]
#[derive(Debug, Clone)]
pub struct InteractionSink {
    live: Arc<Mutex<Vec<Interaction>>>,
}

impl InteractionSink {
    /// Append an interaction
    pub fn push(&self, interaction: Interaction) {
        lock(&self.live).push(interaction);
    }

    /// Log and append an interaction recorded by `cassette`
    ///
    /// Both direct recording and the registry observer go through here.
    pub fn record(&self, cassette: &str, attributes: &MatchAttributes, interaction: Interaction) {
        debug!(
            "Recorded interaction: {} {} {} (cassette: {})",
            RequestFingerprint::of(&interaction.request, attributes).short_hex(),
            interaction.request.method,
            interaction.request.uri,
            cassette
        );
        self.push(interaction);
    }
}

fn lock(live: &Mutex<Vec<Interaction>>) -> MutexGuard<'_, Vec<Interaction>> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drop interactions whose request host is a loopback alias
#[must_use]
pub fn without_loopback(interactions: Vec<Interaction>) -> Vec<Interaction> {
    interactions
        .into_iter()
        .filter(|i| !i.request.host().is_some_and(|host| is_loopback_host(&host)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{Request, Response, ResponseStatus};

    fn interaction(uri: &str, body: &str) -> Interaction {
        Interaction::new(
            Request::new("get", uri),
            Response::new(ResponseStatus::new(200, "OK"), body),
        )
    }

    #[test]
    fn test_record_appends() {
        let store = InteractionStore::new();
        assert!(store.is_empty());

        store.record(interaction("http://example.com/", "a"));
        store.sink().push(interaction("http://example.com/", "b"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.interactions()[1].response.body, "b");
    }

    #[test]
    fn test_new_interactions_after_load() {
        let mut store = InteractionStore::new();
        store.load(vec![
            interaction("http://example.com/", "1"),
            interaction("http://example.com/foo", "2"),
            interaction("http://example.com/", "3"),
        ]);
        assert!(store.new_interactions().is_empty());

        store.record(interaction("http://example.com/bar", "4"));

        let new = store.new_interactions();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].response.body, "4");
        assert_eq!(store.interactions().len(), 4);
        assert_eq!(store.loaded().len(), 3);
    }

    #[test]
    fn test_new_interactions_keep_duplicates() {
        let mut store = InteractionStore::new();
        let repeated = interaction("http://example.com/", "same");
        store.load(vec![repeated.clone()]);

        store.record(repeated.clone());
        store.record(repeated.clone());

        assert_eq!(store.new_interactions(), vec![repeated.clone(), repeated]);
    }

    #[test]
    fn test_sink_record_counts_as_new() {
        let mut store = InteractionStore::new();
        store.load(vec![interaction("http://example.com/", "old")]);

        store.sink().record(
            "example",
            &MatchAttributes::default(),
            interaction("http://example.com/new", "new"),
        );

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.new_interactions(),
            vec![interaction("http://example.com/new", "new")]
        );
    }

    #[test]
    fn test_without_loopback() {
        let filtered = without_loopback(vec![
            interaction("http://localhost/", "a"),
            interaction("http://example.com/", "b"),
            interaction("http://127.0.0.1:8080/x", "c"),
            interaction("http://0.0.0.0/", "d"),
        ]);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].request.uri, "http://example.com/");
    }
}
