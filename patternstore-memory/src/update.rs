//! Update application for in-memory documents.
//!
//! Supports the operators `$set`, `$unset`, `$inc`, `$push` and `$setOnInsert`, plus whole
//! document replacement. Dotted paths address nested documents, creating them on write.

use bson::{Bson, Document, oid::ObjectId};

use patternstore_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    update::Update,
};

const ID_FIELD: &str = "_id";

fn invalid(reason: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(reason.into())
}

/// Applies `update` to `document` in place.
///
/// `inserting` is set when the document is being created by an upsert, which enables
/// `$setOnInsert`.
///
/// # Returns
///
/// `true` if the document changed.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] for unknown operators, operands of the
/// wrong type, or an attempt to change `_id`.
pub(crate) fn apply(document: &mut Document, update: &Update, inserting: bool) -> DocumentStoreResult<bool> {
    let before = document.clone();

    match update {
        Update::Operators(operators) => {
            for (operator, fields) in operators {
                let fields = fields
                    .as_document()
                    .ok_or_else(|| invalid(format!("{operator} expects a document of fields")))?;

                for (path, operand) in fields {
                    apply_operator(document, operator, path, operand, inserting)?;
                }
            }
        }
        Update::Replacement(replacement) => replace(document, replacement)?,
    }

    if document.get(ID_FIELD) != before.get(ID_FIELD) {
        return Err(invalid("the _id field cannot be changed"));
    }

    Ok(*document != before)
}

fn apply_operator(
    document: &mut Document,
    operator: &str,
    path: &str,
    operand: &Bson,
    inserting: bool,
) -> DocumentStoreResult<()> {
    match operator {
        "$set" => set_path(document, path, operand.clone()),
        "$setOnInsert" if inserting => set_path(document, path, operand.clone()),
        "$setOnInsert" => Ok(()),
        "$unset" => {
            unset_path(document, path);
            Ok(())
        }
        "$inc" => {
            let current = get_path(document, path).cloned().unwrap_or(Bson::Int32(0));
            set_path(document, path, increment(path, &current, operand)?)
        }
        "$push" => {
            let mut items = match get_path(document, path) {
                Some(Bson::Array(items)) => items.clone(),
                None => Vec::new(),
                Some(_) => return Err(invalid(format!("$push target {path} is not an array"))),
            };
            items.push(operand.clone());
            set_path(document, path, Bson::Array(items))
        }
        other => Err(invalid(format!("unsupported update operator {other}"))),
    }
}

fn increment(path: &str, current: &Bson, by: &Bson) -> DocumentStoreResult<Bson> {
    match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => Ok(a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(i64::from(*a) + i64::from(*b)))),
        (Bson::Int32(a), Bson::Int64(b)) => wide(path, i64::from(*a), *b),
        (Bson::Int64(a), Bson::Int32(b)) => wide(path, *a, i64::from(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => wide(path, *a, *b),
        (Bson::Double(a), _) => number(by).map(|b| Bson::Double(a + b)),
        (_, Bson::Double(b)) => number(current).map(|a| Bson::Double(a + b)),
        _ => Err(invalid(format!("$inc on {path} needs numeric values"))),
    }
}

fn wide(path: &str, a: i64, b: i64) -> DocumentStoreResult<Bson> {
    a.checked_add(b)
        .map(Bson::Int64)
        .ok_or_else(|| invalid(format!("$inc on {path} overflows")))
}

fn number(value: &Bson) -> DocumentStoreResult<f64> {
    match value {
        Bson::Int32(n) => Ok(f64::from(*n)),
        Bson::Int64(n) => Ok(*n as f64),
        Bson::Double(n) => Ok(*n),
        _ => Err(invalid("$inc needs numeric values")),
    }
}

/// Replaces every field but `_id`. A replacement may repeat the current `_id` but not change it.
fn replace(document: &mut Document, replacement: &Document) -> DocumentStoreResult<()> {
    let mut replaced = Document::new();

    match (document.get(ID_FIELD), replacement.get(ID_FIELD)) {
        (Some(current), Some(requested)) if current != requested => {
            return Err(invalid("the _id field cannot be changed"));
        }
        (Some(id), _) | (None, Some(id)) => {
            replaced.insert(ID_FIELD, id.clone());
        }
        (None, None) => {}
    }

    for (key, value) in replacement {
        if key != ID_FIELD {
            replaced.insert(key.clone(), value.clone());
        }
    }

    *document = replaced;
    Ok(())
}

/// Builds the document an upsert inserts: the filter's equality fields with the update applied.
pub(crate) fn upserted(seed: Document, update: &Update) -> DocumentStoreResult<Document> {
    let mut document = seed;
    apply(&mut document, update, true)?;

    Ok(with_id(document))
}

/// Ensures `document` has an `_id`, placing a fresh one first when it has none.
pub(crate) fn with_id(document: Document) -> Document {
    if document.contains_key(ID_FIELD) {
        return document;
    }

    let mut identified = Document::new();
    identified.insert(ID_FIELD, ObjectId::new());
    for (key, value) in document {
        identified.insert(key, value);
    }

    identified
}

pub(crate) fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(nested) => get_path(nested, rest),
            _ => None,
        },
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(nested)) => set_path(nested, rest, value),
                _ => Err(invalid(format!("cannot set {path}: {head} is not a document"))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(nested)) = document.get_mut(head) {
                unset_path(nested, rest);
            }
        }
    }
}
