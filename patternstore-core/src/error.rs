//! Error types and result types for store and pattern operations.
//!
//! Two layers are modelled here. [`DocumentStoreError`] is what a storage backend reports;
//! [`PatternError`] is what the command processor surfaces to its caller. A backend failure
//! always reaches the caller as [`PatternError::StoreFailure`] with the original error kept
//! as its source.

use bson::error::Error as BsonError;
use serde::{Deserialize, Serialize};
use serde_json::{Error as SerdeJsonError, Value, json};
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a storage backend.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The document or update has an invalid structure for the requested operation.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for backend operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

/// Machine-readable kind of a [`PatternError`], as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidIdentifier,
    MalformedExtendedValue,
    UnknownCommand,
    CollectionRequired,
    StoreFailure,
    NotFound,
    InvalidRequest,
}

/// Errors surfaced to the caller of the command processor.
///
/// Every failed request produces exactly one of these. None of them are retried internally.
#[derive(Error, Debug)]
pub enum PatternError {
    /// The `id` field is missing or is not a valid store identifier.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// A tagged value in `query` or `data` could not be decoded.
    #[error("Malformed extended value: {0}")]
    MalformedExtendedValue(String),
    /// `cmd` is not part of the command vocabulary.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    /// The command needs a `collection` and none was given.
    #[error("Collection required for command {0}")]
    CollectionRequired(String),
    /// The store rejected or failed the operation.
    #[error("Store failure: {0}")]
    StoreFailure(#[from] DocumentStoreError),
    /// An id-based command, or an update, addressed no document.
    #[error("No document matched in collection {collection}{}", .id.as_ref().map(|id| format!(" for id {id}")).unwrap_or_default())]
    NotFound {
        collection: String,
        id: Option<String>,
    },
    /// The pattern does not have the expected shape.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// A specialized `Result` type for pattern processing.
pub type PatternResult<T> = Result<T, PatternError>;

impl PatternError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatternError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            PatternError::MalformedExtendedValue(_) => ErrorKind::MalformedExtendedValue,
            PatternError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            PatternError::CollectionRequired(_) => ErrorKind::CollectionRequired,
            PatternError::StoreFailure(_) => ErrorKind::StoreFailure,
            PatternError::NotFound { .. } => ErrorKind::NotFound,
            PatternError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Builds the structured error response: `{ "error": { "kind": ..., "message": ... } }`.
    pub fn to_response(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn store_failure_keeps_the_backend_error_as_source() {
        let err = PatternError::from(DocumentStoreError::Backend("connection reset".into()));

        assert_eq!(err.kind(), ErrorKind::StoreFailure);
        assert_eq!(
            err.source().map(|source| source.to_string()),
            Some("Backend error: connection reset".to_string())
        );
    }

    #[test]
    fn response_carries_kind_and_message() {
        let err = PatternError::UnknownCommand("explode".into());

        assert_eq!(
            err.to_response(),
            json!({ "error": { "kind": "UnknownCommand", "message": "Unknown command: explode" } })
        );
    }

    #[test]
    fn not_found_message_mentions_the_id_when_known() {
        let with_id = PatternError::NotFound { collection: "test".into(), id: Some("abc".into()) };
        let without_id = PatternError::NotFound { collection: "test".into(), id: None };

        assert_eq!(with_id.to_string(), "No document matched in collection test for id abc");
        assert_eq!(without_id.to_string(), "No document matched in collection test");
    }
}
