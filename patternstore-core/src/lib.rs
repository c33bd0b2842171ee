//! Core of a pattern-driven command processor for schema-less document stores.
//!
//! Requests arrive as generic "patterns" (a command name plus collection, query, data, id and
//! options) and are translated into operations against a document database without losing
//! type information at the wire boundary. This crate provides:
//!
//! - **Extended JSON codec** ([`extjson`]) - Tagged wire forms for dates, object ids, references, regexes and binary data
//! - **Identifier coercion** ([`identifier`]) - Wire identifiers to store identifiers and back
//! - **Pattern normalization** ([`pattern`]) - Validation and decoding of raw patterns into requests
//! - **Command routing** ([`processor`]) - The command vocabulary mapped onto store operations
//! - **Result shaping** ([`response`]) - The response contract for every command
//! - **Pagination** ([`page`]) - `limit`/`offset` handling for `find`
//! - **Store backend abstraction** ([`backend`]) - The capability set a document database must provide
//! - **Collections and stores** ([`collection`], [`store`]) - Handles over a backend
//! - **Filters and updates** ([`query`], [`update`]) - Filter documents, update payloads and write statistics
//! - **Error handling** ([`error`]) - Store-level and request-level error types
//!
//! # Example
//!
//! ```ignore
//! use patternstore_core::processor::PatternProcessor;
//! use serde_json::json;
//!
//! let processor = PatternProcessor::new(backend);
//!
//! let page = processor
//!     .act(json!({
//!         "cmd": "find",
//!         "collection": "users",
//!         "query": { "name": { "$regex": "^al", "$options": "i" } },
//!         "options": { "limit": 10 },
//!     }))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as patternstore_core;

pub mod backend;
pub mod collection;
pub mod error;
pub mod extjson;
pub mod identifier;
pub mod page;
pub mod pattern;
pub mod processor;
pub mod query;
pub mod response;
pub mod store;
pub mod update;
