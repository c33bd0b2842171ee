//! MongoDB backend implementation for patternstore.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Filters
//! and update operators are handed to the server unchanged, so the full MongoDB query
//! language is available to patterns.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! patternstore = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native queries** - Filters, skip and limit are evaluated by the server
//! - **Atomic single-document writes** - `find_one_and_*` for update, replace and delete by filter
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//!
//! # Example
//!
//! ```ignore
//! use patternstore::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as patternstore_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
