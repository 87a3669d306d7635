//! Canonical seed document sources
//!
//! The seed is consumed once at cold start (when the cache holds nothing
//! trusted) and again on every reset.

use async_trait::async_trait;
use planboard_doc::{kind_name, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SeedError;

/// Trait for canonical seed providers
#[async_trait]
pub trait SeedSource: Send + Sync + Debug {
    /// Fetch a fresh copy of the canonical document
    async fn fetch(&self) -> Result<Document, SeedError>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}

/// Seed read from a local JSON file
#[derive(Debug, Clone)]
pub struct FileSeed {
    path: PathBuf,
}

impl FileSeed {
    /// Create file seed
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SeedSource for FileSeed {
    async fn fetch(&self) -> Result<Document, SeedError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SeedError::Io {
                location: self.location(),
                source,
            })?;
        parse_seed(&text, self.location())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Seed fetched with a read-only HTTP GET
#[derive(Debug, Clone)]
pub struct HttpSeed {
    url: String,
    client: reqwest::Client,
}

impl HttpSeed {
    /// Create HTTP seed with a default client
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(url, reqwest::Client::new())
    }

    /// Create HTTP seed with a preconfigured client
    #[inline]
    #[must_use]
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl SeedSource for HttpSeed {
    async fn fetch(&self) -> Result<Document, SeedError> {
        let http_error = |source| SeedError::Http {
            location: self.url.clone(),
            source,
        };
        let response = self.client.get(&self.url).send().await.map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SeedError::Status {
                location: self.url.clone(),
                status: status.as_u16(),
            });
        }
        let text = response.text().await.map_err(http_error)?;
        parse_seed(&text, self.location())
    }

    fn location(&self) -> String {
        self.url.clone()
    }
}

/// Seed held in memory
#[derive(Debug, Clone)]
pub struct StaticSeed {
    document: Document,
}

impl StaticSeed {
    /// Create static seed
    #[inline]
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self { document }
    }
}

#[async_trait]
impl SeedSource for StaticSeed {
    async fn fetch(&self) -> Result<Document, SeedError> {
        if !self.document.is_object() {
            return Err(SeedError::NotADocument {
                location: self.location(),
                found: kind_name(&self.document),
            });
        }
        Ok(self.document.clone())
    }

    fn location(&self) -> String {
        "<static>".to_string()
    }
}

/// Pick a seed source for a location string: URLs go over HTTP,
/// anything else is a file path
#[must_use]
pub fn seed_from_location(location: &str) -> Arc<dyn SeedSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Arc::new(HttpSeed::new(location))
    } else {
        Arc::new(FileSeed::new(location))
    }
}

fn parse_seed(text: &str, location: String) -> Result<Document, SeedError> {
    let document: Value = serde_json::from_str(text).map_err(|source| SeedError::Parse {
        location: location.clone(),
        source,
    })?;
    if !document.is_object() {
        return Err(SeedError::NotADocument {
            location,
            found: kind_name(&document),
        });
    }
    Ok(document)
}

/// Bounded retry with exponential backoff for seed fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub initial_backoff_ms: u64,
}

impl RetryPolicy {
    /// Single attempt, no waiting
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
        }
    }

    /// Delay after the `attempt`-th failure (1-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

/// Fetch the seed, retrying transient failures according to `policy`
///
/// # Errors
/// Returns the only error when a single attempt is allowed, otherwise
/// [`SeedError::Exhausted`] wrapping the last failure
pub async fn fetch_with_retry(
    source: &dyn SeedSource,
    policy: &RetryPolicy,
) -> Result<Document, SeedError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match source.fetch().await {
            Ok(document) => {
                tracing::info!(location = %source.location(), attempt, "Fetched seed document");
                return Ok(document);
            }
            Err(e) if attempt >= attempts => {
                tracing::error!(location = %source.location(), "Seed fetch failed: {}", e);
                if attempts == 1 {
                    return Err(e);
                }
                return Err(SeedError::Exhausted {
                    attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    location = %source.location(),
                    attempt,
                    "Seed fetch failed, retrying in {:?}: {}",
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Debug)]
    struct Flaky {
        failures_left: Mutex<u32>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl SeedSource for Flaky {
        async fn fetch(&self) -> Result<Document, SeedError> {
            *self.calls.lock() += 1;
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(SeedError::Status {
                    location: "flaky".into(),
                    status: 503,
                });
            }
            Ok(json!({"ok": true}))
        }

        fn location(&self) -> String {
            "flaky".into()
        }
    }

    fn flaky(failures: u32) -> Flaky {
        Flaky {
            failures_left: Mutex::new(failures),
            calls: Mutex::new(0),
        }
    }

    #[tokio::test]
    async fn file_seed_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"cenarios": [{"id": "base"}]}"#).unwrap();

        let doc = FileSeed::new(&path).fetch().await.unwrap();
        assert_eq!(doc, json!({"cenarios": [{"id": "base"}]}));
    }

    #[tokio::test]
    async fn file_seed_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSeed::new(dir.path().join("nope.json"))
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(err, SeedError::Io { .. }));
    }

    #[tokio::test]
    async fn file_seed_rejects_non_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "[1]").unwrap();
        assert!(matches!(
            FileSeed::new(&path).fetch().await,
            Err(SeedError::NotADocument { found: "sequence", .. })
        ));
    }

    #[test]
    fn location_dispatch() {
        assert_eq!(
            seed_from_location("https://example.com/data.json").location(),
            "https://example.com/data.json"
        );
        assert_eq!(seed_from_location("./data.json").location(), "./data.json");
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_from_transient_failures() {
        let source = flaky(2);
        let doc = fetch_with_retry(&source, &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(doc, json!({"ok": true}));
        assert_eq!(*source.calls.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up() {
        let source = flaky(10);
        let err = fetch_with_retry(&source, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SeedError::Exhausted { attempts: 3, .. }));
        assert_eq!(*source.calls.lock(), 3);
    }

    #[tokio::test]
    async fn single_attempt_returns_raw_error() {
        let source = flaky(1);
        let err = fetch_with_retry(&source, &RetryPolicy::none())
            .await
            .unwrap_err();
        assert!(matches!(err, SeedError::Status { status: 503, .. }));
    }
}
