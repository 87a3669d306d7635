//! Planning engine
//!
//! Wires the document store, change tracker, auto-save scheduler,
//! notification emitter and persistence together behind one owned handle.
//!
//! # Workflow
//! 1. `mount` checks the session and hydrates the document, from a trusted
//!    cached snapshot or else from the canonical seed
//! 2. `mutate` writes one value, marks dirty and (re)starts the auto-save
//! 3. `save`, `reset` and `import_snapshot` take the commit gate, so they
//!    never interleave with a deferred commit

use planboard_doc::{kind_name, DocPath, Document};
use planboard_persist::{
    fetch_with_retry, CommitReceipt, ExportArtifact, ImportExportBridge, LoadOutcome,
    PersistenceGateway, SeedSource, SnapshotCache,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::auth::{Principal, Session};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::notify::{Notice, NotificationEmitter};
use crate::scheduler::{AutoSaveScheduler, SchedulerState};
use crate::store::DocumentStore;
use crate::tracker::ChangeTracker;

const EXIT_WARNING: &str = "You have unsaved changes. Leave anyway?";

/// Whether a document is available yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Neither the cache nor the seed has produced a document yet
    Loading,
    /// A document is live
    Ready,
}

/// The document mutation and persistence engine
#[derive(Debug)]
pub struct PlanningEngine {
    config: EngineConfig,
    session: Session,
    store: DocumentStore,
    tracker: ChangeTracker,
    notifier: Arc<NotificationEmitter>,
    scheduler: AutoSaveScheduler,
    bridge: ImportExportBridge,
    seed: Arc<dyn SeedSource>,
    shut_down: AtomicBool,
}

impl PlanningEngine {
    /// Mount the engine for an authenticated session and hydrate it
    ///
    /// A seed failure is not fatal: the engine comes up in
    /// [`LoadStatus::Loading`] and [`PlanningEngine::retry_load`] can be
    /// called later.
    ///
    /// # Errors
    /// Returns [`EngineError::Unauthenticated`] if the session has no
    /// principal
    pub async fn mount(
        session: Session,
        config: EngineConfig,
        cache: Arc<dyn SnapshotCache>,
        seed: Arc<dyn SeedSource>,
    ) -> EngineResult<Self> {
        if !session.is_authenticated() {
            tracing::warn!("Refusing to mount engine for unauthenticated session");
            return Err(EngineError::Unauthenticated);
        }

        let notifier = Arc::new(NotificationEmitter::new(
            config.notification_ttl(),
            config.max_notifications,
        ));
        let gateway = PersistenceGateway::new(cache, config.gateway.clone());
        let scheduler = AutoSaveScheduler::new(
            config.autosave_idle(),
            gateway,
            Arc::clone(&notifier),
            Handle::current(),
        );

        let engine = Self {
            bridge: ImportExportBridge::new(config.product_name.clone()),
            config,
            session,
            store: DocumentStore::new(),
            tracker: ChangeTracker::new(),
            notifier,
            scheduler,
            seed,
            shut_down: AtomicBool::new(false),
        };

        if let Err(e) = engine.hydrate().await {
            tracing::error!("Engine mounted without a document: {}", e);
        }
        Ok(engine)
    }

    /// Mount for the local user, for deployments without login
    ///
    /// # Errors
    /// See [`PlanningEngine::mount`]
    pub async fn start(
        config: EngineConfig,
        cache: Arc<dyn SnapshotCache>,
        seed: Arc<dyn SeedSource>,
    ) -> EngineResult<Self> {
        Self::mount(Session::authenticated(Principal::local()), config, cache, seed).await
    }

    async fn hydrate(&self) -> EngineResult<LoadStatus> {
        match self.scheduler.gateway().load().await {
            Ok(LoadOutcome::Loaded(document)) => {
                self.store.replace_whole(document);
                self.tracker.mark_clean();
                return Ok(LoadStatus::Ready);
            }
            Ok(LoadOutcome::NotFound(reason)) => {
                tracing::info!("Loading canonical seed ({})", reason);
            }
            Err(e) => {
                tracing::warn!("Cache unreadable, loading canonical seed: {}", e);
            }
        }

        match fetch_with_retry(self.seed.as_ref(), &self.config.seed_retry).await {
            Ok(document) => {
                self.store.replace_whole(document);
                self.tracker.mark_clean();
                Ok(LoadStatus::Ready)
            }
            Err(e) => {
                self.notifier.error("Could not load planning data");
                Err(e.into())
            }
        }
    }

    /// Retry hydration if no document is live yet
    ///
    /// # Errors
    /// Returns the seed error if loading fails again
    pub async fn retry_load(&self) -> EngineResult<LoadStatus> {
        self.ensure_running()?;
        if self.store.is_loaded() {
            return Ok(LoadStatus::Ready);
        }
        self.hydrate().await
    }

    /// Configuration the engine was mounted with
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Logged-in user
    #[inline]
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.session.principal()
    }

    #[must_use]
    pub fn status(&self) -> LoadStatus {
        if self.store.is_loaded() {
            LoadStatus::Ready
        } else {
            LoadStatus::Loading
        }
    }

    /// Snapshot of the live document
    #[inline]
    #[must_use]
    pub fn document(&self) -> Option<Arc<Document>> {
        self.store.current()
    }

    /// Copy of the value at `path`
    #[inline]
    #[must_use]
    pub fn read(&self, path: &DocPath) -> Option<Value> {
        self.store.read(path)
    }

    /// Write `value` at `path`
    ///
    /// Marks the document dirty and restarts the auto-save timer.
    ///
    /// # Errors
    /// - [`EngineError::Path`] if the path does not resolve; nothing changes
    /// - [`EngineError::NotReady`] before a document is loaded
    /// - [`EngineError::ShutDown`] after [`PlanningEngine::shutdown`]
    pub fn mutate(&self, path: &DocPath, value: Value) -> EngineResult<()> {
        self.ensure_running()?;
        self.store
            .mutate_with(path, value, |document| {
                self.tracker.mark_dirty();
                self.scheduler.schedule_commit(Arc::clone(document));
            })
            .map_err(|e| {
                tracing::debug!(path = %path, "Mutation rejected: {}", e);
                e
            })?;
        tracing::debug!(path = %path, "Mutated document");
        Ok(())
    }

    /// Parse `path` and write `value` there
    ///
    /// # Errors
    /// Same as [`PlanningEngine::mutate`], plus malformed paths
    pub fn set(&self, path: &str, value: Value) -> EngineResult<()> {
        self.mutate(&path.parse::<DocPath>()?, value)
    }

    /// Rewrite the sequence at `path` and store the result as one mutation
    ///
    /// # Errors
    /// [`EngineError::NotASequence`] if `path` does not hold a sequence,
    /// otherwise same as [`PlanningEngine::mutate`]
    pub fn update_collection<F>(&self, path: &DocPath, f: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Vec<Value>),
    {
        self.ensure_running()?;
        if !self.store.is_loaded() {
            return Err(EngineError::NotReady);
        }
        let mut items = match self.store.read(path) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(EngineError::NotASequence {
                    path: path.to_string(),
                    found: kind_name(&other),
                })
            }
            None => {
                return Err(EngineError::NotASequence {
                    path: path.to_string(),
                    found: "nothing",
                })
            }
        };
        f(&mut items);
        self.mutate(path, Value::Array(items))
    }

    /// Commit the live document now, replacing any pending auto-save
    ///
    /// # Errors
    /// Returns error if nothing is loaded or the commit fails; the dirty
    /// flag is kept on failure
    pub async fn save(&self) -> EngineResult<CommitReceipt> {
        self.ensure_running()?;
        let exclusive = self.scheduler.exclusive().await;
        let document = self.store.current().ok_or(EngineError::NotReady)?;

        match exclusive.commit(&document).await {
            Ok(receipt) => {
                // A mutation racing the commit keeps its dirty mark
                self.store.if_current(&document, || self.tracker.mark_clean());
                tracing::info!(bytes = receipt.bytes, "Saved document");
                self.notifier.success("Changes saved");
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!("Save failed: {}", e);
                self.notifier.error(format!("Save failed: {e}"));
                Err(e.into())
            }
        }
    }

    /// Discard local state and reload the canonical seed
    ///
    /// The cache is cleared and not rewritten: the next mutation (or
    /// manual save) persists again.
    ///
    /// # Errors
    /// Returns error if the seed cannot be fetched or the cache cannot be
    /// cleared; the live document is kept in both cases
    pub async fn reset(&self) -> EngineResult<()> {
        self.ensure_running()?;
        let seed = match fetch_with_retry(self.seed.as_ref(), &self.config.seed_retry).await {
            Ok(seed) => seed,
            Err(e) => {
                self.notifier.error(format!("Reset failed: {e}"));
                return Err(e.into());
            }
        };

        let exclusive = self.scheduler.exclusive().await;
        if let Err(e) = exclusive.gateway().clear().await {
            self.notifier.error(format!("Reset failed: {e}"));
            return Err(e.into());
        }
        self.store.replace_whole_with(seed, |_| self.discard_pending());
        drop(exclusive);

        tracing::info!("Reset document to canonical seed");
        self.notifier.info("Data reset to defaults");
        Ok(())
    }

    /// Replace the whole document with an uploaded snapshot and commit it
    ///
    /// # Errors
    /// - [`EngineError::Import`] if the text is not a valid document; the
    ///   live document and the dirty flag are untouched
    /// - [`EngineError::Persist`] if the commit fails; the imported document
    ///   stays live and is marked dirty
    pub async fn import_snapshot(&self, text: &str) -> EngineResult<CommitReceipt> {
        self.ensure_running()?;
        let document = match self.bridge.import_snapshot(text) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Import rejected: {}", e);
                self.notifier.error(format!("Import failed: {e}"));
                return Err(e.into());
            }
        };

        let exclusive = self.scheduler.exclusive().await;
        let document = self.store.replace_whole_with(document, |_| self.discard_pending());

        match exclusive.commit(&document).await {
            Ok(receipt) => {
                tracing::info!(bytes = receipt.bytes, "Imported document");
                self.notifier.success("Data imported");
                Ok(receipt)
            }
            Err(e) => {
                self.tracker.mark_dirty();
                self.notifier.error(format!("Imported data could not be saved: {e}"));
                Err(e.into())
            }
        }
    }

    /// Pretty-printed copy of the live document for download
    ///
    /// # Errors
    /// Returns error if nothing is loaded or serialization fails
    pub fn export_snapshot(&self) -> EngineResult<ExportArtifact> {
        let document = self.store.current().ok_or(EngineError::NotReady)?;
        let artifact = self.bridge.export_snapshot(&document)?;
        tracing::info!(file = %artifact.file_name, "Exported document");
        Ok(artifact)
    }

    /// Unsaved changes since the last save or replacement
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.tracker.is_dirty()
    }

    /// Watch the dirty flag
    #[must_use]
    pub fn subscribe_dirty(&self) -> watch::Receiver<bool> {
        self.tracker.subscribe()
    }

    /// Message for the leave-page guard, present only while dirty
    #[must_use]
    pub fn exit_warning(&self) -> Option<&'static str> {
        self.is_dirty().then_some(EXIT_WARNING)
    }

    /// Time of the last successful commit
    #[must_use]
    pub fn last_saved_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.scheduler.last_saved_at()
    }

    /// Auto-save state
    #[must_use]
    pub fn autosave_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Notification emitter, for subscribing
    #[inline]
    #[must_use]
    pub fn notifications(&self) -> &NotificationEmitter {
        &self.notifier
    }

    /// Notices currently visible
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notifier.active()
    }

    /// Stop the engine: the pending auto-save is dropped and every later
    /// mutation fails with [`EngineError::ShutDown`]
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.scheduler.cancel_pending();
        tracing::info!(dropped_pending_save = dropped, dirty = self.is_dirty(), "Engine shut down");
    }

    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    // Runs under the store write lock, so no timer for the replaced
    // document can be started afterwards
    fn discard_pending(&self) {
        self.scheduler.cancel_pending();
        self.tracker.mark_clean();
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.is_shut_down() {
            Err(EngineError::ShutDown)
        } else {
            Ok(())
        }
    }
}

impl Drop for PlanningEngine {
    fn drop(&mut self) {
        self.scheduler.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planboard_persist::{MemoryCache, StaticSeed};
    use serde_json::json;

    async fn engine(seed: Value) -> PlanningEngine {
        PlanningEngine::start(
            EngineConfig::default(),
            Arc::new(MemoryCache::new()),
            Arc::new(StaticSeed::new(seed)),
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn mount_rejects_anonymous_session() {
        let err = PlanningEngine::mount(
            Session::anonymous(),
            EngineConfig::default(),
            Arc::new(MemoryCache::new()),
            Arc::new(StaticSeed::new(json!({}))),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Unauthenticated));
    }

    #[tokio::test(start_paused = true)]
    async fn update_collection_appends() {
        let engine = engine(json!({"riscos": [{"id": 1}]})).await;
        let path: DocPath = "riscos".parse().unwrap();

        engine
            .update_collection(&path, |items| items.push(json!({"id": 2})))
            .unwrap();

        assert_eq!(engine.read(&path), Some(json!([{"id": 1}, {"id": 2}])));
        assert!(engine.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn update_collection_requires_sequence() {
        let engine = engine(json!({"meta": 10})).await;
        let err = engine
            .update_collection(&"meta".parse().unwrap(), |_| {})
            .unwrap_err();
        assert!(matches!(err, EngineError::NotASequence { found: "number", .. }));
        assert!(!engine.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn exit_warning_follows_dirty() {
        let engine = engine(json!({"a": 1})).await;
        assert_eq!(engine.exit_warning(), None);

        engine.set("a", json!(2)).unwrap();
        assert!(engine.exit_warning().is_some());

        engine.save().await.unwrap();
        assert_eq!(engine.exit_warning(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_mutations() {
        let engine = engine(json!({"a": 1})).await;
        engine.set("a", json!(2)).unwrap();
        assert_eq!(engine.autosave_state(), SchedulerState::Pending);

        engine.shutdown();
        assert_eq!(engine.autosave_state(), SchedulerState::Idle);
        assert!(matches!(engine.set("a", json!(3)), Err(EngineError::ShutDown)));
        assert!(matches!(engine.save().await, Err(EngineError::ShutDown)));
    }
}
