//! Transient user notifications
//!
//! Notices are advisory: they are broadcast to subscribers and kept in a
//! bounded list until their time-to-live runs out. Expired entries are
//! pruned on access.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Category of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Operation completed
    Success,
    /// Operation failed
    Error,
    /// Neutral information
    Info,
}

impl NoticeKind {
    /// Short display label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "ok",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Monotonic identifier
    pub id: u64,
    /// Category
    pub kind: NoticeKind,
    /// Text shown to the user
    pub message: String,
    /// Wall-clock creation time
    pub raised_at: DateTime<Utc>,
    expires_at: Instant,
}

impl Notice {
    /// Whether the notice is past its time-to-live
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Publishes notices to subscribers and keeps the visible ones
#[derive(Debug)]
pub struct NotificationEmitter {
    ttl: Duration,
    max_active: usize,
    next_id: AtomicU64,
    active: Mutex<VecDeque<Notice>>,
    tx: broadcast::Sender<Notice>,
}

impl NotificationEmitter {
    /// Create emitter with a time-to-live and a cap on visible notices
    #[must_use]
    pub fn new(ttl: Duration, max_active: usize) -> Self {
        let max_active = max_active.max(1);
        let (tx, _) = broadcast::channel(max_active.saturating_mul(4).min(1024));
        Self {
            ttl,
            max_active,
            next_id: AtomicU64::new(1),
            active: Mutex::new(VecDeque::new()),
            tx,
        }
    }

    /// Raise a notice
    pub fn emit(&self, kind: NoticeKind, message: impl Into<String>) -> Notice {
        let notice = Notice {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            message: message.into(),
            raised_at: Utc::now(),
            expires_at: Instant::now() + self.ttl,
        };
        tracing::debug!(kind = %kind, "Notice: {}", notice.message);

        {
            let mut active = self.active.lock();
            active.retain(|n| !n.is_expired());
            active.push_back(notice.clone());
            while active.len() > self.max_active {
                active.pop_front();
            }
        }

        // No subscribers is fine
        let _ = self.tx.send(notice.clone());
        notice
    }

    /// Raise a success notice
    pub fn success(&self, message: impl Into<String>) -> Notice {
        self.emit(NoticeKind::Success, message)
    }

    /// Raise an error notice
    pub fn error(&self, message: impl Into<String>) -> Notice {
        self.emit(NoticeKind::Error, message)
    }

    /// Raise an informational notice
    pub fn info(&self, message: impl Into<String>) -> Notice {
        self.emit(NoticeKind::Info, message)
    }

    /// Notices that have not expired, oldest first
    #[must_use]
    pub fn active(&self) -> Vec<Notice> {
        let mut active = self.active.lock();
        active.retain(|n| !n.is_expired());
        active.iter().cloned().collect()
    }

    /// Remove a notice before it expires
    pub fn dismiss(&self, id: u64) -> bool {
        let mut active = self.active.lock();
        let before = active.len();
        active.retain(|n| n.id != id);
        active.len() != before
    }

    /// Receive every notice raised from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}
