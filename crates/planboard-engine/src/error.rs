//! Error types for the planning engine
//!
//! Every failure here is recoverable: the live document is left exactly as
//! it was before the failing call.

use planboard_doc::PathError;
use planboard_persist::{BridgeError, CacheError, GatewayError, ImportError, SeedError};

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Path could not be parsed or resolved
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// No document has been loaded yet
    #[error("document is still loading")]
    NotReady,

    /// Mount attempted without a logged-in principal
    #[error("session is not authenticated")]
    Unauthenticated,

    /// Engine was shut down
    #[error("engine has been shut down")]
    ShutDown,

    /// Collection edit addressed something other than a sequence
    #[error("'{path}' is a {found}, expected a sequence")]
    NotASequence { path: String, found: &'static str },

    /// Snapshot commit failed
    #[error("commit failed: {0}")]
    Persist(#[from] GatewayError),

    /// Durable cache failed outside a commit
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Canonical seed could not be fetched
    #[error("seed unavailable: {0}")]
    Seed(#[from] SeedError),

    /// Uploaded snapshot rejected
    #[error("import rejected: {0}")]
    Import(#[from] ImportError),

    /// Export serialization failed
    #[error("export failed: {0}")]
    Export(#[from] BridgeError),

    /// Configuration file could not be parsed
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl EngineError {
    /// True if the caller can fix the error by changing its input
    #[inline]
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Path(_) | Self::NotASequence { .. } | Self::Import(_)
        )
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
