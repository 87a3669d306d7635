//! Planboard Persistence Layer
//!
//! The boundary between the in-memory planning document and everything
//! outside it: the durable snapshot cache, the canonical seed, and
//! user-supplied export/import files.
//!
//! # Core Operations
//!
//! - **Load**: Hydrate from a cached snapshot if its version tag and
//!   structure are trusted, otherwise report a miss
//! - **Commit**: Write the full document plus the schema version tag
//! - **Seed**: Fetch the canonical document from a file or URL, with retry
//! - **Export/Import**: Pretty-printed snapshot out, whole-document replace in
//!
//! # Architecture
//!
//! ```text
//! SeedSource ──fetch──┐
//!                     ▼
//!  Document ⇄ PersistenceGateway ⇄ SnapshotCache (snapshot slot + version slot)
//!     ▲
//!     └── ImportExportBridge ⇄ user files
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod bridge;
pub mod cache;
pub mod error;
pub mod gateway;
pub mod seed;

// Re-exports for convenience
pub use bridge::{ExportArtifact, ImportExportBridge};
pub use cache::{FileCache, MemoryCache, SnapshotCache};
pub use error::{BridgeError, CacheError, GatewayError, ImportError, SeedError};
pub use gateway::{
    CommitReceipt, GatewayConfig, IntegrityProbe, LoadOutcome, MissReason, PersistenceGateway,
};
pub use seed::{
    fetch_with_retry, seed_from_location, FileSeed, HttpSeed, RetryPolicy, SeedSource, StaticSeed,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the persistence layer
    pub use crate::bridge::{ExportArtifact, ImportExportBridge};
    pub use crate::cache::{FileCache, MemoryCache, SnapshotCache};
    pub use crate::gateway::{GatewayConfig, LoadOutcome, MissReason, PersistenceGateway};
    pub use crate::seed::{RetryPolicy, SeedSource};
    pub use planboard_doc::{DocPath, Document};
}
