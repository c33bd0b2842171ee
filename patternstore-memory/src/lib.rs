//! In-memory document storage backend for patternstore.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Filter language** - Comparison, logical, element and regular expression operators over dotted paths
//! - **Update operators** - `$set`, `$unset`, `$inc`, `$push`, `$setOnInsert` and whole-document replacement
//! - **Upserts** - New documents seeded from the equality fields of the filter
//!
//! # Quick Start
//!
//! ```ignore
//! use patternstore::{PatternProcessor, memory::InMemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let processor = PatternProcessor::new(InMemoryStore::new());
//!
//!     let created = processor
//!         .act(json!({ "cmd": "create", "collection": "users", "data": { "name": "Alice" } }))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as patternstore_memory;

pub mod store;
pub mod evaluator;
pub mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
