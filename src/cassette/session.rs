//! Cassette session: the open/record/eject state machine

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::options::{CassetteOptions, ResolvedOptions};
use super::store::{without_loopback, InteractionStore};
use super::RecordMode;
use crate::config::Config;
use crate::fingerprint::MatchAttributes;
use crate::interaction::Interaction;
use crate::registry::{Checkpoint, RealRequestObserver, StubRegistry};
use crate::storage::{cassette_file_name, cassette_path, CassetteReader, CassetteWriter};
use crate::template::TemplateContext;
use crate::Result;

/// Lifecycle state of a cassette
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CassetteState {
    /// Reading persisted interactions and installing stubs
    Loading,
    /// Accepting recorded interactions
    Active,
    /// Interactions persisted and registry restored
    Ejected,
}

/// A named, open cassette
///
/// Opening a cassette checkpoints the registry, adjusts its
/// connections-allowed flag and installs previously recorded interactions.
/// [`Cassette::eject`] writes new interactions back and undoes every
/// registry change, so cassettes can be nested or used back to back without
/// leaking stubs.
pub struct Cassette {
    name: String,
    record_mode: RecordMode,
    match_requests_on: MatchAttributes,
    templating: Option<TemplateContext>,
    file: Option<PathBuf>,
    store: InteractionStore,
    registry: Arc<dyn StubRegistry>,
    checkpoint: Option<Checkpoint>,
    original_connections_allowed: bool,
    previous_observer: Option<RealRequestObserver>,
    state: CassetteState,
}

impl Cassette {
    /// Open a cassette
    ///
    /// `options` are layered over `config.default_cassette_options`. The
    /// registry's real-request observer is pointed at this cassette until
    /// it is ejected.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before touching the registry if the
    /// options are invalid. Load failures (I/O, templating, format, registry)
    /// are returned after the registry has been rolled back.
    pub fn open(
        name: impl Into<String>,
        options: CassetteOptions,
        config: &Config,
        registry: Arc<dyn StubRegistry>,
    ) -> Result<Self> {
        let name = name.into();
        let resolved = options.merged_over(&config.default_cassette_options).resolve();
        let connections_allowed = resolved.connections_allowed();
        let ResolvedOptions {
            record,
            match_requests_on,
            templating,
            ..
        } = resolved;

        let original_connections_allowed = registry.connections_allowed();
        registry.set_connections_allowed(connections_allowed);

        let checkpoint = match registry.checkpoint(&name) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                registry.set_connections_allowed(original_connections_allowed);
                return Err(e.into());
            }
        };

        let mut cassette = Self {
            file: config
                .cassette_library_dir
                .as_deref()
                .map(|dir| cassette_path(dir, &name)),
            name,
            record_mode: record,
            match_requests_on,
            templating,
            store: InteractionStore::new(),
            registry,
            checkpoint: Some(checkpoint),
            original_connections_allowed,
            previous_observer: None,
            state: CassetteState::Loading,
        };

        if let Err(e) = cassette.load() {
            cassette.rollback();
            return Err(e);
        }

        let observer = cassette.observer();
        cassette.previous_observer = cassette.registry.set_observer(Some(observer));
        cassette.state = CassetteState::Active;

        info!(
            "Opened cassette '{}' (record: {}, match on: {:?}, loaded: {})",
            cassette.name,
            cassette.record_mode,
            cassette.match_requests_on.as_slice(),
            cassette.store.loaded().len()
        );

        Ok(cassette)
    }

    /// Cassette name as given
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active record mode
    #[must_use]
    pub fn record_mode(&self) -> RecordMode {
        self.record_mode
    }

    /// Active match attributes
    #[must_use]
    pub fn match_requests_on(&self) -> &MatchAttributes {
        &self.match_requests_on
    }

    /// Backing file, `None` when no library dir is configured
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> CassetteState {
        self.state
    }

    /// Snapshot of loaded and recorded interactions, in order
    #[must_use]
    pub fn interactions(&self) -> Vec<Interaction> {
        self.store.interactions()
    }

    /// Append a real interaction
    ///
    /// The registry's observer calls this path for every real request made
    /// while the cassette is open. Repeats are kept.
    pub fn record(&self, interaction: Interaction) {
        self.store
            .sink()
            .record(&self.name, &self.match_requests_on, interaction);
    }

    /// Persist new interactions and restore the registry
    ///
    /// The full sequence is written only when something new was recorded,
    /// so an unchanged cassette file keeps its content and timestamp. The
    /// registry is restored even if the write fails.
    ///
    /// # Errors
    ///
    /// Returns the write error, if any, otherwise any registry error raised
    /// while restoring
    pub fn eject(mut self) -> Result<()> {
        let new_interactions = self.store.new_interactions();

        let written = match &self.file {
            Some(path) if !new_interactions.is_empty() => {
                let interactions = self.store.interactions();
                info!(
                    "Ejecting cassette '{}': writing {} interactions ({} new) to {}",
                    self.name,
                    interactions.len(),
                    new_interactions.len(),
                    path.display()
                );
                CassetteWriter::new(path).write(&interactions)
            }
            _ => {
                debug!(
                    "Ejecting cassette '{}': {} new interactions, nothing written",
                    self.name,
                    new_interactions.len()
                );
                Ok(())
            }
        };

        let restored = self.restore_registry();
        self.state = CassetteState::Ejected;

        written?;
        restored
    }

    fn load(&mut self) -> Result<()> {
        if !self.record_mode.loads_interactions() {
            return Ok(());
        }

        let Some(path) = &self.file else {
            return Ok(());
        };

        let reader = CassetteReader::new(path, cassette_file_name(&self.name));
        let mut interactions = reader.load(self.templating.as_ref())?;

        if self.registry.ignoring_loopback() {
            let before = interactions.len();
            interactions = without_loopback(interactions);
            if interactions.len() != before {
                debug!(
                    "Skipped {} loopback interactions in cassette '{}'",
                    before - interactions.len(),
                    self.name
                );
            }
        }

        self.store.load(interactions);

        if !self.store.loaded().is_empty() {
            self.registry
                .install(self.store.loaded(), &self.match_requests_on)?;
        }

        Ok(())
    }

    fn observer(&self) -> RealRequestObserver {
        let sink = self.store.sink();
        let name = self.name.clone();
        let attributes = self.match_requests_on.clone();

        Arc::new(move |interaction: &Interaction| {
            sink.record(&name, &attributes, interaction.clone());
        })
    }

    /// Undo registry changes after a failed load
    fn rollback(&mut self) {
        if let Err(e) = self.restore_registry() {
            warn!("Failed to roll back cassette '{}': {}", self.name, e);
        }
        self.state = CassetteState::Ejected;
    }

    fn restore_registry(&mut self) -> Result<()> {
        if self.state == CassetteState::Active {
            self.registry.set_observer(self.previous_observer.take());
        }

        let restored = match self.checkpoint.take() {
            Some(checkpoint) => self.registry.restore(checkpoint).map_err(Into::into),
            None => Ok(()),
        };

        self.registry
            .set_connections_allowed(self.original_connections_allowed);

        restored
    }
}

impl Drop for Cassette {
    fn drop(&mut self) {
        if self.state == CassetteState::Ejected {
            return;
        }

        // Unwinding out of a test body lands here; new interactions are
        // not persisted
        warn!(
            "Cassette '{}' dropped without eject; restoring registry without writing",
            self.name
        );
        if let Err(e) = self.restore_registry() {
            warn!("Failed to restore registry for cassette '{}': {}", self.name, e);
        }
        self.state = CassetteState::Ejected;
    }
}
