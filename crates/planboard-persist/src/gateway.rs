//! Versioned snapshot persistence
//!
//! A snapshot is trusted only if its version tag equals the expected schema
//! version and it passes the structural probe. Anything else is a miss and
//! the caller falls back to the canonical seed: there is no partial
//! migration.

use chrono::{DateTime, Utc};
use planboard_doc::{kind_name, DocPath, Document, PathResolver};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::cache::SnapshotCache;
use crate::error::{CacheError, GatewayError};

/// Where snapshots live and which version is trusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Expected schema version tag
    pub schema_version: String,
    /// Cache key of the serialized document
    pub snapshot_key: String,
    /// Cache key of the version tag
    pub version_key: String,
    /// Structural sanity probe run before trusting a snapshot
    pub probe: Option<IntegrityProbe>,
}

impl GatewayConfig {
    /// With schema version
    #[inline]
    #[must_use]
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// With structural probe
    #[inline]
    #[must_use]
    pub fn with_probe(mut self, probe: IntegrityProbe) -> Self {
        self.probe = Some(probe);
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            schema_version: "1".to_string(),
            snapshot_key: "planboard:data".to_string(),
            version_key: "planboard:data-version".to_string(),
            probe: None,
        }
    }
}

/// Structural sanity check for cached snapshots
///
/// Passes when `collection` addresses a non-empty sequence whose first
/// element is a mapping containing `field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityProbe {
    /// Path of a collection every valid document carries
    pub collection: DocPath,
    /// Field the first element of that collection must have
    pub field: String,
}

impl IntegrityProbe {
    /// Create probe
    #[inline]
    #[must_use]
    pub fn new(collection: DocPath, field: impl Into<String>) -> Self {
        Self {
            collection,
            field: field.into(),
        }
    }

    /// Run the probe
    ///
    /// # Errors
    /// Returns a description of the first failed expectation
    pub fn check(&self, document: &Value) -> Result<(), String> {
        let collection = PathResolver::read(document, &self.collection)
            .ok_or_else(|| format!("'{}' is missing", self.collection))?;
        let first = collection
            .as_array()
            .ok_or_else(|| format!("'{}' is a {}, not a sequence", self.collection, kind_name(collection)))?
            .first()
            .ok_or_else(|| format!("'{}' is empty", self.collection))?;
        match first.as_object() {
            Some(map) if map.contains_key(&self.field) => Ok(()),
            _ => Err(format!(
                "first element of '{}' has no '{}' field",
                self.collection, self.field
            )),
        }
    }
}

/// Why a load produced no trusted document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// Nothing cached
    Empty,
    /// Version tag absent or different from the expected one
    VersionMismatch {
        found: Option<String>,
        expected: String,
    },
    /// Snapshot slot missing or not a serialized document
    Corrupt(String),
    /// Structural probe failed
    IntegrityFailure(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("no cached snapshot"),
            Self::VersionMismatch { found, expected } => write!(
                f,
                "cached version {} does not match expected {expected}",
                found.as_deref().unwrap_or("<none>")
            ),
            Self::Corrupt(detail) => write!(f, "cached snapshot is corrupt: {detail}"),
            Self::IntegrityFailure(detail) => {
                write!(f, "cached snapshot failed integrity probe: {detail}")
            }
        }
    }
}

/// Result of [`PersistenceGateway::load`]
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Trusted snapshot
    Loaded(Document),
    /// No trusted snapshot; fetch the canonical seed instead
    NotFound(MissReason),
}

impl LoadOutcome {
    /// The hydrated document, if any
    #[inline]
    #[must_use]
    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Loaded(document) => Some(document),
            Self::NotFound(_) => None,
        }
    }
}

/// Facts about a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Version tag written alongside the snapshot
    pub version: String,
    /// Serialized size in bytes
    pub bytes: usize,
    /// Wall-clock time of the commit
    pub committed_at: DateTime<Utc>,
}

/// Reads and writes versioned document snapshots
#[derive(Debug, Clone)]
pub struct PersistenceGateway {
    cache: Arc<dyn SnapshotCache>,
    config: GatewayConfig,
}

impl PersistenceGateway {
    /// Create gateway over a cache backend
    #[inline]
    #[must_use]
    pub fn new(cache: Arc<dyn SnapshotCache>, config: GatewayConfig) -> Self {
        Self { cache, config }
    }

    /// Gateway configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Load a trusted snapshot
    ///
    /// # Errors
    /// Returns error only if the cache backend itself fails; untrusted
    /// snapshots are reported as [`LoadOutcome::NotFound`]
    pub async fn load(&self) -> Result<LoadOutcome, CacheError> {
        let tag = self.cache.read(&self.config.version_key).await?;
        let raw = self.cache.read(&self.config.snapshot_key).await?;

        let outcome = match (tag, raw) {
            (None, None) => LoadOutcome::NotFound(MissReason::Empty),
            (tag, _) if tag.as_deref() != Some(self.config.schema_version.as_str()) => {
                LoadOutcome::NotFound(MissReason::VersionMismatch {
                    found: tag,
                    expected: self.config.schema_version.clone(),
                })
            }
            (_, None) => LoadOutcome::NotFound(MissReason::Corrupt(
                "version tag present without a snapshot".to_string(),
            )),
            (_, Some(raw)) => self.trust(&raw),
        };

        match &outcome {
            LoadOutcome::Loaded(_) => {
                tracing::info!(version = %self.config.schema_version, "Hydrated document from cache");
            }
            LoadOutcome::NotFound(MissReason::Empty) => {
                tracing::debug!("No cached snapshot");
            }
            LoadOutcome::NotFound(reason) => {
                tracing::warn!("Ignoring cached snapshot: {}", reason);
            }
        }
        Ok(outcome)
    }

    fn trust(&self, raw: &str) -> LoadOutcome {
        let document: Value = match serde_json::from_str(raw) {
            Ok(document) => document,
            Err(e) => return LoadOutcome::NotFound(MissReason::Corrupt(e.to_string())),
        };
        if !document.is_object() {
            return LoadOutcome::NotFound(MissReason::Corrupt(format!(
                "root is a {}",
                kind_name(&document)
            )));
        }
        if let Some(probe) = &self.config.probe {
            if let Err(detail) = probe.check(&document) {
                return LoadOutcome::NotFound(MissReason::IntegrityFailure(detail));
            }
        }
        LoadOutcome::Loaded(document)
    }

    /// Persist the full document and the current version tag
    ///
    /// # Errors
    /// Returns error if serialization or either cache write fails
    pub async fn commit(&self, document: &Document) -> Result<CommitReceipt, GatewayError> {
        let serialized = serde_json::to_string(document)?;
        self.cache
            .write(&self.config.snapshot_key, &serialized)
            .await?;
        self.cache
            .write(&self.config.version_key, &self.config.schema_version)
            .await?;

        tracing::debug!(bytes = serialized.len(), "Committed snapshot");
        Ok(CommitReceipt {
            version: self.config.schema_version.clone(),
            bytes: serialized.len(),
            committed_at: Utc::now(),
        })
    }

    /// Remove the snapshot and its version tag
    ///
    /// # Errors
    /// Returns error if the cache backend fails
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.cache.remove(&self.config.snapshot_key).await?;
        self.cache.remove(&self.config.version_key).await?;
        tracing::info!("Cleared cached snapshot");
        Ok(())
    }
}
