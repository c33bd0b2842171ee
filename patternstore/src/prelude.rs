//! Convenient re-exports of commonly used types from patternstore.
//!
//! ```ignore
//! use patternstore::prelude::*;
//! ```

pub use patternstore_core::{
    collection::Collection,
    store::DocumentStore,
    backend::{StoreBackend, DynStoreBackend, StoreBackendBuilder},
    query::{Query, QueryBuilder, QueryVisitor, Expr, FieldOp},
    update::{Update, UpdateStats},
    pattern::{Command, Pattern, Payload, Request},
    processor::{PatternProcessor, PatternProcessorBuilder},
    response::OperationResult,
    page::PaginationOptions,
    error::{DocumentStoreError, DocumentStoreResult, ErrorKind, PatternError, PatternResult},
};

pub use crate::config::{BackendConfig, StoreConfig};
