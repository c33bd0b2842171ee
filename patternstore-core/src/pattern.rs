//! Pattern requests and their normalization.
//!
//! A pattern arrives as loosely typed JSON: `{ cmd, collection, query?, data?, id?, options? }`.
//! `query`, `data` and `options` may each be a mapping or a string holding extended JSON, and
//! `id` is a hex string. [`Pattern`] captures the raw shape leniently, and
//! [`Pattern::normalize`] turns it into a [`Request`] whose fields are native values. All
//! validation happens here, so that a request that reaches a handler is well formed and an
//! invalid identifier never costs a store call.

use bson::{Bson, Document, oid::ObjectId};
use serde::Deserialize;
use serde_json::Value;
use std::{fmt, str::FromStr};

use crate::{
    error::{PatternError, PatternResult},
    extjson,
    identifier::coerce_id,
    page::PaginationOptions,
};

/// The command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Create,
    Update,
    UpdateById,
    Replace,
    ReplaceById,
    Remove,
    RemoveById,
    Find,
    FindById,
    DropCollection,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::Create,
        Command::Update,
        Command::UpdateById,
        Command::Replace,
        Command::ReplaceById,
        Command::Remove,
        Command::RemoveById,
        Command::Find,
        Command::FindById,
        Command::DropCollection,
    ];

    /// The name used for this command on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Create => "create",
            Command::Update => "update",
            Command::UpdateById => "updateById",
            Command::Replace => "replace",
            Command::ReplaceById => "replaceById",
            Command::Remove => "remove",
            Command::RemoveById => "removeById",
            Command::Find => "find",
            Command::FindById => "findById",
            Command::DropCollection => "dropCollection",
        }
    }

    /// `true` for commands addressed by `id` rather than `query`.
    pub fn is_by_id(&self) -> bool {
        matches!(
            self,
            Command::UpdateById | Command::ReplaceById | Command::RemoveById | Command::FindById
        )
    }

    /// `true` for commands addressed by `query`.
    pub fn is_by_query(&self) -> bool {
        matches!(
            self,
            Command::Update | Command::Replace | Command::Remove | Command::Find
        )
    }

    fn takes_data(&self) -> bool {
        matches!(
            self,
            Command::Create
                | Command::Update
                | Command::UpdateById
                | Command::Replace
                | Command::ReplaceById
        )
    }

    fn requires_data(&self) -> bool {
        matches!(
            self,
            Command::Create | Command::Replace | Command::ReplaceById
        )
    }
}

impl FromStr for Command {
    type Err = PatternError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|command| command.name() == name)
            .ok_or_else(|| PatternError::UnknownCommand(name.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The `data` of a pattern: one document or a batch of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    SingleDocument(Document),
    DocumentBatch(Vec<Document>),
}

impl Payload {
    /// Returns the single document, rejecting batches for commands that write one shape.
    pub fn into_single(self, command: Command) -> PatternResult<Document> {
        match self {
            Payload::SingleDocument(document) => Ok(document),
            Payload::DocumentBatch(_) => Err(PatternError::InvalidRequest(format!(
                "{command} expects data to be a single mapping"
            ))),
        }
    }
}

/// A raw pattern as received from the transport.
///
/// Every field is optional so that shape problems can be reported with the right error kind
/// instead of a generic deserialization failure. Fields the processor does not know about,
/// such as the transport's `topic`, are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Pattern {
    pub cmd: Option<Value>,
    pub collection: Option<Value>,
    pub query: Option<Value>,
    pub data: Option<Value>,
    pub id: Option<Value>,
    pub options: Option<Value>,
}

impl Pattern {
    /// Reads a pattern from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidRequest`] if the value is not a mapping.
    pub fn from_value(value: Value) -> PatternResult<Self> {
        if !value.is_object() {
            return Err(PatternError::InvalidRequest("a pattern must be a mapping".into()));
        }

        serde_json::from_value(value).map_err(|e| PatternError::InvalidRequest(e.to_string()))
    }

    /// Validates the pattern and decodes its fields into native values.
    ///
    /// Fields are checked in order: `cmd`, then `collection`, then `id` for id-based commands,
    /// then `query`, `data` and `options`. Fields a command does not use are not inspected.
    ///
    /// # Errors
    ///
    /// - [`PatternError::InvalidRequest`] if `cmd` is missing or not a string, or a field has the wrong shape
    /// - [`PatternError::UnknownCommand`] if `cmd` is not part of the vocabulary
    /// - [`PatternError::CollectionRequired`] if `collection` is missing or empty
    /// - [`PatternError::InvalidIdentifier`] if an id-based command has a missing or invalid `id`
    /// - [`PatternError::MalformedExtendedValue`] if a string field is not JSON, or a tag payload is invalid
    pub fn normalize(self) -> PatternResult<Request> {
        let command = match self.cmd {
            Some(Value::String(name)) => name.parse::<Command>()?,
            Some(_) => return Err(PatternError::InvalidRequest("cmd must be a string".into())),
            None => return Err(PatternError::InvalidRequest("cmd is required".into())),
        };

        let collection = match self.collection {
            Some(Value::String(name)) if !name.is_empty() => name,
            Some(Value::String(_)) | None => {
                return Err(PatternError::CollectionRequired(command.to_string()));
            }
            Some(_) => {
                return Err(PatternError::InvalidRequest("collection must be a string".into()));
            }
        };

        let id = if command.is_by_id() {
            let id = self
                .id
                .ok_or_else(|| PatternError::InvalidIdentifier(format!("{command} requires an id")))?;
            Some(coerce_id(&id)?)
        } else {
            None
        };

        let query = match self.query {
            Some(query) if command.is_by_query() => normalize_document("query", &query)?,
            _ => Document::new(),
        };

        let data = match self.data {
            Some(data) if command.takes_data() => Some(normalize_payload(&data)?),
            _ => None,
        };

        if data.is_none() && command.requires_data() {
            return Err(PatternError::InvalidRequest(format!("{command} requires data")));
        }

        let pagination = match self.options {
            Some(options) if command == Command::Find => {
                PaginationOptions::from_options(&normalize_document("options", &options)?)?
            }
            _ => PaginationOptions::default(),
        };

        Ok(Request {
            command,
            collection,
            id,
            query,
            data,
            pagination,
        })
    }
}

/// A validated request with native field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: Command,
    pub collection: String,
    /// Present exactly for id-based commands.
    pub id: Option<ObjectId>,
    /// Filter for query-based commands; empty matches every document.
    pub query: Document,
    pub data: Option<Payload>,
    /// Requested window; only `find` reads one.
    pub pagination: PaginationOptions,
}

impl Request {
    /// The filter addressing this request's documents: by `_id` for id-based commands,
    /// by `query` otherwise.
    pub fn filter(&self) -> Document {
        match self.id {
            Some(id) => bson::doc! { "_id": id },
            None => self.query.clone(),
        }
    }
}

/// Normalizes a field that may be a mapping or an extended JSON string.
///
/// A string is parsed as JSON and then decoded; anything else is decoded directly. Exactly
/// one of the two paths is taken.
pub fn normalize_value(field: &str, value: &Value) -> PatternResult<Bson> {
    let decoded = match value {
        Value::String(text) => {
            let parsed = serde_json::from_str::<Value>(text)
                .map_err(|e| PatternError::MalformedExtendedValue(format!("{field}: {e}")))?;
            extjson::decode(&parsed)
        }
        other => extjson::decode(other),
    };

    decoded.map_err(|e| PatternError::MalformedExtendedValue(format!("{field}: {e}")))
}

/// Normalizes a field that must end up as a mapping.
///
/// # Errors
///
/// Returns [`PatternError::InvalidRequest`] if the normalized value is not a mapping.
pub fn normalize_document(field: &str, value: &Value) -> PatternResult<Document> {
    match normalize_value(field, value)? {
        Bson::Document(document) => Ok(document),
        other => Err(PatternError::InvalidRequest(format!(
            "{field} must be a mapping, got {:?}",
            other.element_type()
        ))),
    }
}

/// Normalizes `data` into a single document or a batch.
pub fn normalize_payload(value: &Value) -> PatternResult<Payload> {
    match normalize_value("data", value)? {
        Bson::Document(document) => Ok(Payload::SingleDocument(document)),
        Bson::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Bson::Document(document) => Ok(document),
                _ => Err(PatternError::InvalidRequest(format!(
                    "data[{index}] must be a mapping"
                ))),
            })
            .collect::<PatternResult<Vec<_>>>()
            .map(Payload::DocumentBatch),
        other => Err(PatternError::InvalidRequest(format!(
            "data must be a mapping or a list of mappings, got {:?}",
            other.element_type()
        ))),
    }
}
