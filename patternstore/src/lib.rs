//! Main patternstore crate: a pattern-driven command processor for schema-less document stores.
//!
//! This crate is the primary entry point. It re-exports the core types from the sub-crates,
//! provides access to the storage backends, and assembles a configured processor from
//! [`config::StoreConfig`].
//!
//! # Features
//!
//! - **Lossless wire format** - Dates, object ids, references, regexes and binary data travel as tagged extended JSON
//! - **Fixed command vocabulary** - create, update, replace, remove, find and dropCollection, by query or by id
//! - **Multiple backends** - In-memory and MongoDB storage behind one async trait
//! - **Structured errors** - Every failure maps to a machine-readable kind
//!
//! # Quick Start
//!
//! ```ignore
//! use patternstore::{prelude::*, memory::InMemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let processor = PatternProcessor::new(InMemoryStore::builder().build().await.unwrap());
//!
//!     let created = processor
//!         .act(json!({
//!             "cmd": "create",
//!             "collection": "users",
//!             "data": { "name": "Alice", "joined": { "$date": "2017-03-13T16:21:18.000Z" } },
//!         }))
//!         .await
//!         .unwrap();
//!
//!     let found = processor
//!         .act(json!({ "cmd": "findById", "collection": "users", "id": created["_id"] }))
//!         .await
//!         .unwrap();
//!
//!     println!("Found user: {found}");
//!
//!     processor.shutdown().await.unwrap();
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Backends selected at runtime are boxed as [`backend::DynStoreBackend`], which is itself a
//! [`backend::StoreBackend`]. [`config::StoreConfig::build_processor`] returns a processor over
//! such a boxed backend.
//!
//! ```ignore
//! use patternstore::config::StoreConfig;
//!
//! let processor = StoreConfig::from_json(r#"{ "max_limit": 100 }"#)?
//!     .build_processor()
//!     .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod config;
pub mod prelude;

pub use patternstore_core::{
    backend, collection, error, extjson, identifier, page, pattern, processor, query, response, store,
    update,
};

pub use patternstore_core::{error::PatternError, processor::PatternProcessor};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use patternstore_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use patternstore_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
