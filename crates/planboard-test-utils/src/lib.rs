//! Testing utilities for the Planboard workspace
//!
//! Shared fixtures, seed sources and cache backends with scripted failures.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use planboard_doc::Document;
use planboard_persist::{CacheError, MemoryCache, SeedError, SeedSource, SnapshotCache};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SNAPSHOT_KEY: &str = "planboard:data";
pub const VERSION_KEY: &str = "planboard:data-version";

/// A small but representative planning document
#[must_use]
pub fn sample_plan() -> Document {
    json!({
        "empresa": {"nome": "Acme Vendas", "ano": 2025},
        "cenarios": [
            {"id": "base", "nome": "Base", "receita": 1_200_000},
            {"id": "otimista", "nome": "Otimista", "receita": 1_500_000}
        ],
        "metas": {
            "mensal": [100, 110, 120, 120, 130, 140, 140, 150, 160, 160, 170, 180],
            "trimestral": [
                {"trimestre": "T1", "valor": 330},
                {"trimestre": "T2", "valor": 390},
                {"trimestre": "T3", "valor": 450},
                {"trimestre": "T4", "valor": 510}
            ]
        },
        "remuneracao": {"fixo": 5000, "variavel": {"percentual": 0.05}},
        "kpis": {"nps": 71, "churn": 0.02},
        "riscos": [
            {"id": 1, "descricao": "Atraso na contratação", "nivel": "medio"}
        ],
        "comercial": {"status": "em andamento"}
    })
}

/// Memory cache already holding `document` under the default slots
#[must_use]
pub fn cache_with_snapshot(document: &Document, version: &str) -> Arc<MemoryCache> {
    Arc::new(MemoryCache::with_entries([
        (SNAPSHOT_KEY.to_string(), document.to_string()),
        (VERSION_KEY.to_string(), version.to_string()),
    ]))
}

/// Seed that fails a fixed number of times before succeeding
#[derive(Debug)]
pub struct FlakySeed {
    document: Mutex<Document>,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakySeed {
    #[must_use]
    pub fn new(document: Document, failures: u32) -> Self {
        Self {
            document: Mutex::new(document),
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    /// Seed that never succeeds
    #[must_use]
    pub fn always_failing() -> Self {
        Self::new(json!({}), u32::MAX)
    }

    /// Number of fetch attempts so far
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next fetches fail again
    pub fn fail_next(&self, failures: u32) {
        self.failures_left.store(failures, Ordering::SeqCst);
    }

    /// Change the document served on success
    pub fn set_document(&self, document: Document) {
        *self.document.lock() = document;
    }
}

#[async_trait]
impl SeedSource for FlakySeed {
    async fn fetch(&self) -> Result<Document, SeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SeedError::Status {
                location: self.location(),
                status: 503,
            });
        }
        Ok(self.document.lock().clone())
    }

    fn location(&self) -> String {
        "flaky://seed".to_string()
    }
}

/// Memory cache whose writes can be switched to fail
#[derive(Debug, Default)]
pub struct FailingCache {
    inner: MemoryCache,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl FailingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// The backing memory cache
    #[must_use]
    pub fn memory(&self) -> &MemoryCache {
        &self.inner
    }
}

#[async_trait]
impl SnapshotCache for FailingCache {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("read refused".to_string()));
        }
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("quota exceeded".to_string()));
        }
        self.inner.write(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key).await
    }
}

/// Memory cache whose writes take a fixed time to complete
#[derive(Debug)]
pub struct SlowCache {
    inner: MemoryCache,
    write_delay: Duration,
}

impl SlowCache {
    #[must_use]
    pub fn new(write_delay: Duration) -> Self {
        Self {
            inner: MemoryCache::new(),
            write_delay,
        }
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryCache {
        &self.inner
    }
}

#[async_trait]
impl SnapshotCache for SlowCache {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        tokio::time::sleep(self.write_delay).await;
        self.inner.write(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key).await
    }
}
