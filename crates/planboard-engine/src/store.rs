//! Copy-on-write holder of the live planning document
//!
//! Readers get an `Arc` to a complete document. A mutation clones the
//! document, writes into the clone and swaps the `Arc`, so a reader holding
//! the previous version never sees it change.

use parking_lot::RwLock;
use planboard_doc::{DocPath, Document, PathResolver};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};

/// Owner of the single live document
#[derive(Debug, Default)]
pub struct DocumentStore {
    live: RwLock<Option<Arc<Document>>>,
}

impl DocumentStore {
    /// Create an empty store (nothing loaded yet)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `document`
    #[must_use]
    pub fn with_document(document: Document) -> Self {
        Self {
            live: RwLock::new(Some(Arc::new(document))),
        }
    }

    /// Snapshot of the live document
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<Arc<Document>> {
        self.live.read().clone()
    }

    /// Whether a document has been loaded
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.live.read().is_some()
    }

    /// Copy of the value at `path`
    #[must_use]
    pub fn read(&self, path: &DocPath) -> Option<Value> {
        let guard = self.live.read();
        PathResolver::read(guard.as_deref()?, path).cloned()
    }

    /// Write `value` at `path` and return the new live document
    ///
    /// # Errors
    /// - [`EngineError::NotReady`] if nothing is loaded
    /// - [`EngineError::Path`] if the path does not resolve; the live
    ///   document is not touched
    pub fn mutate(&self, path: &DocPath, value: Value) -> EngineResult<Arc<Document>> {
        self.mutate_with(path, value, |_| {})
    }

    /// Like [`DocumentStore::mutate`], running `on_swap` with the new
    /// document before the write lock is released
    ///
    /// Swaps and their `on_swap` calls happen in the same order, so the
    /// last `on_swap` always sees the live document.
    ///
    /// # Errors
    /// Same as [`DocumentStore::mutate`]; `on_swap` is not called
    pub fn mutate_with<F>(
        &self,
        path: &DocPath,
        value: Value,
        on_swap: F,
    ) -> EngineResult<Arc<Document>>
    where
        F: FnOnce(&Arc<Document>),
    {
        let mut live = self.live.write();
        let current = live.as_ref().ok_or(EngineError::NotReady)?;

        let mut next = Document::clone(current);
        PathResolver::write(&mut next, path, value)?;

        let next = Arc::new(next);
        *live = Some(Arc::clone(&next));
        on_swap(&next);
        Ok(next)
    }

    /// Replace the whole document, bypassing path resolution
    pub fn replace_whole(&self, document: Document) -> Arc<Document> {
        self.replace_whole_with(document, |_| {})
    }

    /// Replace the whole document, running `on_swap` under the write lock
    pub fn replace_whole_with<F>(&self, document: Document, on_swap: F) -> Arc<Document>
    where
        F: FnOnce(&Arc<Document>),
    {
        let next = Arc::new(document);
        let mut live = self.live.write();
        *live = Some(Arc::clone(&next));
        on_swap(&next);
        next
    }

    /// Run `f` if `document` is still the live document, holding off swaps
    /// until it returns
    pub fn if_current<F>(&self, document: &Arc<Document>, f: F) -> bool
    where
        F: FnOnce(),
    {
        let live = self.live.read();
        let current = live.as_ref().is_some_and(|live| Arc::ptr_eq(live, document));
        if current {
            f();
        }
        current
    }

    /// Drop the live document, returning it
    pub fn clear(&self) -> Option<Arc<Document>> {
        self.live.write().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planboard_doc::PathError;
    use serde_json::json;

    fn path(s: &str) -> DocPath {
        s.parse().unwrap()
    }

    #[test]
    fn mutate_before_load_is_not_ready() {
        let store = DocumentStore::new();
        assert!(matches!(
            store.mutate(&path("a"), json!(1)),
            Err(EngineError::NotReady)
        ));
        assert!(!store.is_loaded());
    }

    #[test]
    fn mutate_swaps_without_aliasing() {
        let store = DocumentStore::with_document(json!({"a": {"b": 1}}));
        let before = store.current().unwrap();

        let after = store.mutate(&path("a.b"), json!(2)).unwrap();

        assert_eq!(*before, json!({"a": {"b": 1}}));
        assert_eq!(*after, json!({"a": {"b": 2}}));
        assert!(Arc::ptr_eq(&after, &store.current().unwrap()));
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn failed_mutate_leaves_document() {
        let store = DocumentStore::with_document(json!({"items": [{}, {}, {}]}));
        let before = store.current().unwrap();

        let err = store.mutate(&path("items[5].name"), json!("x")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Path(PathError::OutOfRange { index: 5, len: 3, .. })
        ));
        assert!(Arc::ptr_eq(&before, &store.current().unwrap()));
    }

    #[test]
    fn read_copies_value() {
        let store = DocumentStore::with_document(json!({"kpis": {"nps": 71}}));
        assert_eq!(store.read(&path("kpis.nps")), Some(json!(71)));
        assert_eq!(store.read(&path("kpis.churn")), None);
    }

    proptest::proptest! {
        #[test]
        fn index_writes_never_grow_sequences(index in 0usize..8, value in proptest::num::i64::ANY) {
            let store = DocumentStore::with_document(json!({"mensal": [1, 2, 3]}));
            let before = store.current().unwrap();
            let path = DocPath::key("mensal").child_index(index);

            match store.mutate(&path, json!(value)) {
                Ok(after) => {
                    proptest::prop_assert!(index < 3);
                    proptest::prop_assert_eq!(after["mensal"].as_array().unwrap().len(), 3);
                    proptest::prop_assert_eq!(&after["mensal"][index], &json!(value));
                }
                Err(_) => {
                    proptest::prop_assert!(index >= 3);
                    proptest::prop_assert!(Arc::ptr_eq(&before, &store.current().unwrap()));
                }
            }
        }
    }

    #[test]
    fn on_swap_sees_new_document() {
        let store = DocumentStore::with_document(json!({"a": 1}));
        let mut seen = None;
        store
            .mutate_with(&path("a"), json!(2), |doc| seen = Some(Arc::clone(doc)))
            .unwrap();
        assert!(Arc::ptr_eq(&seen.unwrap(), &store.current().unwrap()));

        let mut called = false;
        assert!(store.mutate_with(&path("a[0]"), json!(3), |_| called = true).is_err());
        assert!(!called);
    }

    #[test]
    fn if_current_skips_replaced_document() {
        let store = DocumentStore::with_document(json!({"a": 1}));
        let old = store.current().unwrap();
        let mut hits = 0;
        assert!(store.if_current(&old, || hits += 1));

        store.replace_whole_with(json!({"a": 9}), |_| hits += 10);
        assert!(!store.if_current(&old, || hits += 100));
        assert_eq!(hits, 11);
    }

    #[test]
    fn replace_and_clear() {
        let store = DocumentStore::new();
        store.replace_whole(json!({"x": 1}));
        assert_eq!(store.read(&path("x")), Some(json!(1)));

        let old = store.clear().unwrap();
        assert_eq!(*old, json!({"x": 1}));
        assert!(store.current().is_none());
    }
}
