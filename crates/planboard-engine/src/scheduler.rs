//! Debounced auto-save
//!
//! # State machine
//!
//! ```text
//!          schedule                fire / cancel
//!   Idle ───────────▶ Pending ─────────────────────▶ Idle
//!                      │  ▲
//!                      └──┘ schedule (timer replaced)
//! ```
//!
//! At most one deferred commit is outstanding. Every schedule aborts the
//! previous timer and starts a new one, so a burst of mutations inside the
//! idle window collapses into a single commit of the last document.
//!
//! All cache writes go through one async commit gate. A fired timer takes
//! the gate and then claims its slot; if it was cancelled or superseded in
//! the meantime it exits without writing. Callers needing exclusive access
//! (manual save, reset, import) cancel first and then take the gate, so an
//! already-claimed commit finishes before them and a cancelled one never
//! writes. Cancellation is repeated once the gate is held, which drops
//! timers started while an in-flight commit was finishing.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use planboard_doc::Document;
use planboard_persist::{CommitReceipt, GatewayError, PersistenceGateway};
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::notify::NotificationEmitter;

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No deferred commit outstanding
    Idle,
    /// A deferred commit is waiting for the idle window to pass
    Pending,
}

#[derive(Debug)]
enum Timer {
    Idle,
    Pending {
        generation: u64,
        handle: JoinHandle<()>,
    },
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    timer: Timer,
}

#[derive(Debug)]
struct Inner {
    idle: Duration,
    gateway: PersistenceGateway,
    notifier: Arc<NotificationEmitter>,
    gate: AsyncMutex<()>,
    slot: Mutex<Slot>,
    last_saved: Mutex<Option<DateTime<Utc>>>,
    runtime: Handle,
}

/// Debounces commits of the live document
#[derive(Debug, Clone)]
pub struct AutoSaveScheduler {
    inner: Arc<Inner>,
}

impl AutoSaveScheduler {
    /// Create scheduler spawning its timers on `runtime`
    #[must_use]
    pub fn new(
        idle: Duration,
        gateway: PersistenceGateway,
        notifier: Arc<NotificationEmitter>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                idle,
                gateway,
                notifier,
                gate: AsyncMutex::new(()),
                slot: Mutex::new(Slot {
                    generation: 0,
                    timer: Timer::Idle,
                }),
                last_saved: Mutex::new(None),
                runtime,
            }),
        }
    }

    /// Gateway commits go through
    #[inline]
    #[must_use]
    pub fn gateway(&self) -> &PersistenceGateway {
        &self.inner.gateway
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        match self.inner.slot.lock().timer {
            Timer::Idle => SchedulerState::Idle,
            Timer::Pending { .. } => SchedulerState::Pending,
        }
    }

    /// Time of the last successful commit, deferred or explicit
    #[must_use]
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_saved.lock()
    }

    /// (Re)start the idle timer for `document`
    pub fn schedule_commit(&self, document: Arc<Document>) {
        let mut slot = self.inner.slot.lock();
        if let Timer::Pending { handle, .. } = mem::replace(&mut slot.timer, Timer::Idle) {
            handle.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;

        let inner = Arc::clone(&self.inner);
        let handle = self.inner.runtime.spawn(async move {
            tokio::time::sleep(inner.idle).await;
            inner.fire(generation, document).await;
        });
        slot.timer = Timer::Pending { generation, handle };
        tracing::debug!(generation, idle = ?self.inner.idle, "Auto-save scheduled");
    }

    /// Drop the outstanding deferred commit, if any
    ///
    /// Returns true if a commit was pending. A commit that already claimed
    /// its slot is not interrupted.
    pub fn cancel_pending(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        slot.generation += 1;
        match mem::replace(&mut slot.timer, Timer::Idle) {
            Timer::Pending { handle, generation } => {
                handle.abort();
                tracing::debug!(generation, "Auto-save cancelled");
                true
            }
            Timer::Idle => false,
        }
    }

    /// Cancel any pending commit and wait for exclusive access to the cache
    ///
    /// Timers scheduled while waiting for the gate are cancelled too. Timers
    /// scheduled while the guard is held are left alone.
    pub async fn exclusive(&self) -> ExclusiveCommit<'_> {
        self.cancel_pending();
        let guard = self.inner.gate.lock().await;
        self.cancel_pending();
        ExclusiveCommit {
            inner: &self.inner,
            _guard: guard,
        }
    }

    /// Cancel any pending commit and commit `document` immediately
    ///
    /// # Errors
    /// Returns error if the gateway commit fails
    pub async fn commit_now(&self, document: &Document) -> Result<CommitReceipt, GatewayError> {
        self.exclusive().await.commit(document).await
    }
}

/// Exclusive access to the cache, held while the commit gate is locked
#[derive(Debug)]
pub struct ExclusiveCommit<'a> {
    inner: &'a Inner,
    _guard: MutexGuard<'a, ()>,
}

impl ExclusiveCommit<'_> {
    /// Commit `document` and record the save time
    ///
    /// # Errors
    /// Returns error if the gateway commit fails
    pub async fn commit(&self, document: &Document) -> Result<CommitReceipt, GatewayError> {
        self.inner.commit(document).await
    }

    /// Gateway, for operations other than commit
    #[inline]
    #[must_use]
    pub fn gateway(&self) -> &PersistenceGateway {
        &self.inner.gateway
    }
}

impl Inner {
    async fn fire(&self, generation: u64, document: Arc<Document>) {
        let _gate = self.gate.lock().await;
        {
            let mut slot = self.slot.lock();
            match mem::replace(&mut slot.timer, Timer::Idle) {
                Timer::Pending { generation: g, .. } if g == generation => {}
                other => {
                    slot.timer = other;
                    tracing::debug!(generation, "Stale auto-save skipped");
                    return;
                }
            }
        }

        match self.commit(&document).await {
            Ok(receipt) => {
                tracing::info!(bytes = receipt.bytes, "Auto-saved document");
                self.notifier.success("Changes saved automatically");
            }
            Err(e) => {
                tracing::warn!("Auto-save failed: {}", e);
                self.notifier.error(format!("Auto-save failed: {e}"));
            }
        }
    }

    async fn commit(&self, document: &Document) -> Result<CommitReceipt, GatewayError> {
        let receipt = self.gateway.commit(document).await?;
        *self.last_saved.lock() = Some(receipt.committed_at);
        Ok(receipt)
    }
}
