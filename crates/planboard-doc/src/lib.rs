//! Planboard Document Addressing
//!
//! Typed paths into nested planning documents and the resolver that applies
//! writes at those paths.
//!
//! # Core Concepts
//!
//! - [`DocPath`]: Parsed address such as `metas.trimestral[2].valor`
//! - [`Segment`]: Mapping key or sequence index
//! - [`PathResolver`]: Resolves a path to its write target, creating
//!   intermediate mappings on the way
//! - [`Document`]: The nested JSON value the engine owns
//!
//! # Example
//!
//! ```
//! use planboard_doc::{DocPath, PathResolver};
//! use serde_json::json;
//!
//! let mut doc = json!({"a": {"b": 1}});
//! let path: DocPath = "a.b".parse().unwrap();
//!
//! PathResolver::write(&mut doc, &path, json!(2)).unwrap();
//! assert_eq!(PathResolver::read(&doc, &path), Some(&json!(2)));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod path;
mod resolver;

pub use path::{DocPath, PathError, Segment};
pub use resolver::{kind_name, PathResolver, Target};

/// A planning document: nested mappings and sequences with scalar leaves.
pub type Document = serde_json::Value;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
