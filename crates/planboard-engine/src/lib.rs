//! Planboard Engine
//!
//! Path-addressed mutation and persistence for a planning document:
//! - Copy-on-write document store with typed path writes
//! - Dirty tracking for the leave-page guard
//! - Debounced auto-save to a versioned snapshot cache
//! - Manual save, reset, import and export
//! - Transient success/error notifications
//!
//! # Example
//!
//! ```rust,ignore
//! use planboard_engine::{EngineConfig, PlanningEngine};
//! use planboard_persist::{MemoryCache, StaticSeed};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = PlanningEngine::start(
//!     EngineConfig::default(),
//!     Arc::new(MemoryCache::new()),
//!     Arc::new(StaticSeed::new(json!({"metas": {"anual": 100}}))),
//! )
//! .await?;
//!
//! engine.set("metas.anual", json!(120))?;
//! assert!(engine.is_dirty());
//! engine.save().await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod scheduler;
pub mod store;
pub mod tracker;

// Re-exports for convenience
pub use auth::{Authenticator, Credentials, Principal, Session, StaticAuthenticator};
pub use config::{AuthConfig, EngineConfig, UserRecord};
pub use engine::{LoadStatus, PlanningEngine};
pub use error::{EngineError, EngineResult};
pub use notify::{Notice, NoticeKind, NotificationEmitter};
pub use scheduler::{AutoSaveScheduler, ExclusiveCommit, SchedulerState};
pub use store::DocumentStore;
pub use tracker::ChangeTracker;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the engine
    pub use crate::{
        EngineConfig, EngineError, EngineResult, LoadStatus, NoticeKind, PlanningEngine,
        Session,
    };
    pub use planboard_doc::{DocPath, Document};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
