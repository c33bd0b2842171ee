//! Update payloads and write statistics.

use bson::{Bson, Document, doc};

use crate::error::{PatternError, PatternResult};

/// The `$set` operator, used to turn a plain mapping into a merge.
pub const SET_OPERATOR: &str = "$set";

/// An update payload, classified once at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Every top-level key is an update operator such as `$set` or `$inc`.
    Operators(Document),
    /// No top-level key is an operator; the document replaces the stored one (keeping `_id`).
    Replacement(Document),
}

impl Update {
    /// Classifies a decoded `data` mapping.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidRequest`] when operators and plain fields are mixed.
    pub fn from_document(document: Document) -> PatternResult<Self> {
        let operators = document.keys().filter(|key| key.starts_with('$')).count();

        match operators {
            0 => Ok(Update::Replacement(document)),
            n if n == document.len() => Ok(Update::Operators(document)),
            _ => Err(PatternError::InvalidRequest(
                "update data must either use only operators or contain none".into(),
            )),
        }
    }

    /// Turns a replacement into a `$set` of its fields so it merges into the stored document.
    pub fn into_merge(self) -> Self {
        match self {
            Update::Replacement(fields) => Update::Operators(doc! { SET_OPERATOR: fields }),
            operators => operators,
        }
    }

    /// `true` when applying this update could not change anything.
    pub fn is_empty(&self) -> bool {
        match self {
            Update::Operators(operators) => operators
                .values()
                .all(|fields| fields.as_document().is_some_and(Document::is_empty)),
            Update::Replacement(_) => false,
        }
    }

    pub fn as_document(&self) -> &Document {
        match self {
            Update::Operators(document) | Update::Replacement(document) => document,
        }
    }
}

/// Raw outcome of an update-many style write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateStats {
    /// Documents matched by the filter.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
    /// Identifier of the document inserted by an upsert, if any.
    pub upserted_id: Option<Bson>,
}
