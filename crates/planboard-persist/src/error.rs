//! Error types for the persistence layer
//!
//! Provides error handling for:
//! - Durable cache access
//! - Snapshot commits
//! - Seed fetches
//! - Export and import of user files

/// Errors from a [`SnapshotCache`](crate::cache::SnapshotCache) backend
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// IO error on a cache slot
    #[error("io error on cache slot '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Key cannot be mapped onto the backend
    #[error("invalid cache key: '{0}'")]
    InvalidKey(String),

    /// Backend-specific failure
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    /// Create IO error for a slot
    pub fn io_error(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }
}

/// Errors while committing a snapshot
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Cache write failed
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Document could not be serialized
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors while fetching the canonical seed document
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// Local seed file could not be read
    #[error("io error reading seed {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP request failed before a response arrived
    #[error("request for seed {location} failed: {source}")]
    Http {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("seed {location} returned status {status}")]
    Status { location: String, status: u16 },

    /// Seed body is not valid JSON
    #[error("seed {location} is not valid JSON: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    /// Seed parsed, but its root is not a mapping
    #[error("seed {location} root is a {found}, expected a mapping")]
    NotADocument {
        location: String,
        found: &'static str,
    },

    /// Every retry attempt failed
    #[error("seed fetch gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<SeedError>,
    },
}

/// Errors while ingesting an uploaded snapshot
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Text is not valid serialized-document syntax
    #[error("import is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Text parsed, but its root is not a mapping
    #[error("import root is a {0}, expected a mapping")]
    NotADocument(&'static str),
}

/// Errors while exporting a snapshot
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Document could not be serialized
    #[error("export serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
