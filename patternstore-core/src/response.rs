//! Operation results and their wire shape.

use bson::{Bson, Document};
use serde_json::{Map, Value, json};

use crate::{
    extjson,
    identifier::wire_id,
    page::{LIMIT_OPTION, OFFSET_OPTION},
};

/// The outcome of a successfully handled pattern. Built fresh for every request.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// A single document was inserted.
    Created { id: Bson },
    /// A batch was inserted; identifiers are in input order.
    CreatedMany { ids: Vec<Bson> },
    /// A single addressed document: updated, replaced, removed or found.
    Updated { document: Document },
    /// Outcome of a replace-many with upsert.
    ReplaceStats {
        matched: u64,
        modified: u64,
        upserted: u64,
    },
    DeleteStats { deleted_count: u64 },
    /// One page of a find, with the effective window.
    FindResult {
        documents: Vec<Document>,
        limit: Option<u64>,
        offset: Option<u64>,
    },
}

impl OperationResult {
    /// Renders the result in its response form.
    ///
    /// Identifiers of created documents are sent in their string form; document contents are
    /// encoded as extended JSON. A window bound that is not in effect is left out.
    pub fn into_json(self) -> Value {
        match self {
            OperationResult::Created { id } => json!({ "_id": wire_id(&id) }),
            OperationResult::CreatedMany { ids } => {
                json!({ "_ids": ids.iter().map(wire_id).collect::<Vec<_>>() })
            }
            OperationResult::Updated { document } => extjson::encode_document(&document),
            OperationResult::ReplaceStats { matched, modified, upserted } => json!({
                "matchedCount": matched,
                "modifiedCount": modified,
                "upsertedCount": upserted,
            }),
            OperationResult::DeleteStats { deleted_count } => json!({ "deletedCount": deleted_count }),
            OperationResult::FindResult { documents, limit, offset } => {
                let mut body = Map::new();
                body.insert(
                    "result".to_string(),
                    Value::Array(documents.iter().map(extjson::encode_document).collect()),
                );

                if let Some(limit) = limit {
                    body.insert(LIMIT_OPTION.to_string(), json!(limit));
                }

                if let Some(offset) = offset {
                    body.insert(OFFSET_OPTION.to_string(), json!(offset));
                }

                Value::Object(body)
            }
        }
    }
}
