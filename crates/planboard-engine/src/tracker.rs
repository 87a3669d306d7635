//! Dirty-state tracking
//!
//! Dirty means "changed since the last explicit save or whole-document
//! replacement". Deferred auto-saves do not clear it.

use tokio::sync::watch;

/// Observable dirty flag
#[derive(Debug)]
pub struct ChangeTracker {
    dirty: watch::Sender<bool>,
}

impl ChangeTracker {
    /// Create a clean tracker
    #[must_use]
    pub fn new() -> Self {
        let (dirty, _) = watch::channel(false);
        Self { dirty }
    }

    /// Flag unsaved changes
    pub fn mark_dirty(&self) {
        self.set(true);
    }

    /// Clear the flag after a save or replacement
    pub fn mark_clean(&self) {
        self.set(false);
    }

    /// Whether there are unsaved changes
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        *self.dirty.borrow()
    }

    /// Receiver that wakes on every flip of the flag
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.dirty.subscribe()
    }

    fn set(&self, value: bool) {
        let changed = self.dirty.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
        if changed {
            tracing::debug!(dirty = value, "Dirty flag changed");
        }
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}
