//! The command processor.
//!
//! [`PatternProcessor`] is the entry point the transport calls with each incoming pattern. It
//! normalizes the pattern into a [`Request`], routes it by command to a handler, issues the
//! handler's operations against the injected backend, and shapes the outcome into an
//! [`OperationResult`].
//!
//! # Example
//!
//! ```ignore
//! use patternstore_core::processor::PatternProcessor;
//! use serde_json::json;
//!
//! let processor = PatternProcessor::builder(backend).max_limit(100).build();
//!
//! let created = processor
//!     .act(json!({ "cmd": "create", "collection": "users", "data": { "name": "Alice" } }))
//!     .await?;
//! ```

use bson::Document;
use serde_json::Value;

use crate::{
    backend::StoreBackend,
    collection::Collection,
    error::{DocumentStoreError, PatternError, PatternResult},
    pattern::{Command, Pattern, Payload, Request},
    response::OperationResult,
    store::DocumentStore,
    update::Update,
};

/// Topic the processor answers on unless configured otherwise.
pub const DEFAULT_TOPIC: &str = "mongo-store";

const LOG_TARGET: &str = "patternstore::processor";

/// Routes pattern requests to store operations.
///
/// The processor holds no per-request state; it can be shared behind an `Arc` and used from
/// any number of tasks at once.
#[derive(Debug)]
pub struct PatternProcessor<B: StoreBackend> {
    store: DocumentStore<B>,
    topic: String,
    max_limit: Option<u64>,
}

impl<B: StoreBackend> PatternProcessor<B> {
    /// Creates a processor with the default topic and no limit ceiling.
    pub fn new(backend: B) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: B) -> PatternProcessorBuilder<B> {
        PatternProcessorBuilder::new(backend)
    }

    /// The topic this processor is registered under.
    ///
    /// Only reported, never checked: delivering patterns for this topic is the transport's job,
    /// and a pattern's own `topic` field is ignored.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The ceiling applied to `find` limits, if any.
    pub fn max_limit(&self) -> Option<u64> {
        self.max_limit
    }

    pub fn store(&self) -> &DocumentStore<B> {
        &self.store
    }

    /// Handles a raw pattern and renders the result.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] describing why the pattern could not be served.
    pub async fn act(&self, pattern: Value) -> PatternResult<Value> {
        let result = async {
            let request = Pattern::from_value(pattern)?.normalize()?;
            self.handle(request).await
        }
        .await;

        match result {
            Ok(result) => Ok(result.into_json()),
            Err(err) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    kind = ?err.kind(),
                    error = %err,
                    "Pattern failed"
                );
                Err(err)
            }
        }
    }

    /// Like [`act`](Self::act), but renders failures as an error response instead of returning them.
    pub async fn respond(&self, pattern: Value) -> Value {
        self.act(pattern)
            .await
            .unwrap_or_else(|err| err.to_response())
    }

    /// Runs a normalized request against the store.
    ///
    /// # Errors
    ///
    /// - [`PatternError::NotFound`] when an id-based command or an update addresses no document
    /// - [`PatternError::InvalidRequest`] when `data` has the wrong shape for the command
    /// - [`PatternError::StoreFailure`] when the backend fails
    pub async fn handle(&self, request: Request) -> PatternResult<OperationResult> {
        tracing::debug!(
            target: LOG_TARGET,
            cmd = %request.command,
            collection = %request.collection,
            id = ?request.id,
            "Dispatching pattern"
        );

        let collection = self.store.collection(&request.collection);

        match request.command {
            Command::Create => self.create(&collection, request).await,
            Command::Update | Command::UpdateById => self.update(&collection, request).await,
            Command::Replace => self.replace(&collection, request).await,
            Command::ReplaceById => self.replace_by_id(&collection, request).await,
            Command::Remove => self.remove(&collection, request).await,
            Command::RemoveById => self.remove_by_id(&collection, request).await,
            Command::Find => self.find(&collection, request).await,
            Command::FindById => self.find_by_id(&collection, request).await,
            Command::DropCollection => self.drop_collection(&collection).await,
        }
    }

    /// Shuts down the underlying store.
    pub async fn shutdown(self) -> PatternResult<()> {
        Ok(self.store.shutdown().await?)
    }

    async fn create(
        &self,
        collection: &Collection<'_, B>,
        request: Request,
    ) -> PatternResult<OperationResult> {
        match required_data(&request)? {
            Payload::SingleDocument(document) => {
                let id = collection
                    .insert(vec![document])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| DocumentStoreError::Backend("insert returned no identifier".into()))?;

                Ok(OperationResult::Created { id })
            }
            Payload::DocumentBatch(documents) if documents.is_empty() => {
                Ok(OperationResult::CreatedMany { ids: Vec::new() })
            }
            Payload::DocumentBatch(documents) => Ok(OperationResult::CreatedMany {
                ids: collection.insert(documents).await?,
            }),
        }
    }

    /// `update` and `updateById`: a merge into the addressed documents, returning the first.
    async fn update(
        &self,
        collection: &Collection<'_, B>,
        request: Request,
    ) -> PatternResult<OperationResult> {
        let filter = request.filter();
        let update = match request.data.clone() {
            Some(payload) => Update::from_document(payload.into_single(request.command)?)?.into_merge(),
            None => Update::Operators(Document::new()),
        };

        if update.is_empty() {
            return collection
                .find_one(filter)
                .await?
                .map(|document| OperationResult::Updated { document })
                .ok_or_else(|| not_found(&request));
        }

        let first = match request.command {
            Command::Update => collection.update_returning_first(filter, update).await?,
            _ => collection.find_and_update(filter, update, false).await?,
        }
        .ok_or_else(|| not_found(&request))?;

        Ok(OperationResult::Updated { document: first })
    }

    async fn replace(
        &self,
        collection: &Collection<'_, B>,
        request: Request,
    ) -> PatternResult<OperationResult> {
        let update = Update::from_document(required_data(&request)?.into_single(request.command)?)?;
        let stats = collection
            .update(request.query, update, true)
            .await?;

        Ok(OperationResult::ReplaceStats {
            matched: stats.matched,
            modified: stats.modified,
            upserted: u64::from(stats.upserted_id.is_some()),
        })
    }

    async fn replace_by_id(
        &self,
        collection: &Collection<'_, B>,
        request: Request,
    ) -> PatternResult<OperationResult> {
        let update = Update::from_document(required_data(&request)?.into_single(request.command)?)?;

        collection
            .find_and_update(request.filter(), update, true)
            .await?
            .map(|document| OperationResult::Updated { document })
            .ok_or_else(|| not_found(&request))
    }

    async fn remove(
        &self,
        collection: &Collection<'_, B>,
        request: Request,
    ) -> PatternResult<OperationResult> {
        Ok(OperationResult::DeleteStats {
            deleted_count: collection.delete(request.query).await?,
        })
    }

    async fn remove_by_id(
        &self,
        collection: &Collection<'_, B>,
        request: Request,
    ) -> PatternResult<OperationResult> {
        collection
            .find_and_delete(request.filter())
            .await?
            .map(|document| OperationResult::Updated { document })
            .ok_or_else(|| not_found(&request))
    }

    async fn find(
        &self,
        collection: &Collection<'_, B>,
        request: Request,
    ) -> PatternResult<OperationResult> {
        let window = request.pagination.resolve(self.max_limit);
        let documents = collection
            .find(window.to_query(request.query))
            .await?;

        Ok(OperationResult::FindResult {
            documents,
            limit: window.limit,
            offset: window.offset,
        })
    }

    async fn find_by_id(
        &self,
        collection: &Collection<'_, B>,
        request: Request,
    ) -> PatternResult<OperationResult> {
        collection
            .find_one(request.filter())
            .await?
            .map(|document| OperationResult::Updated { document })
            .ok_or_else(|| not_found(&request))
    }

    async fn drop_collection(&self, collection: &Collection<'_, B>) -> PatternResult<OperationResult> {
        let deleted_count = collection.count(Document::new()).await?;
        collection.drop().await?;

        Ok(OperationResult::DeleteStats { deleted_count })
    }
}

fn required_data(request: &Request) -> PatternResult<Payload> {
    request
        .data
        .clone()
        .ok_or_else(|| PatternError::InvalidRequest(format!("{} requires data", request.command)))
}

fn not_found(request: &Request) -> PatternError {
    PatternError::NotFound {
        collection: request.collection.clone(),
        id: request.id.map(|id| id.to_hex()),
    }
}

/// Builder for [`PatternProcessor`].
#[derive(Debug)]
pub struct PatternProcessorBuilder<B: StoreBackend> {
    backend: B,
    topic: String,
    max_limit: Option<u64>,
}

impl<B: StoreBackend> PatternProcessorBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            topic: DEFAULT_TOPIC.to_string(),
            max_limit: None,
        }
    }

    /// Sets the topic the processor answers on.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Caps the number of documents a single `find` may return.
    pub fn max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    pub fn build(self) -> PatternProcessor<B> {
        PatternProcessor {
            store: DocumentStore::new(self.backend),
            topic: self.topic,
            max_limit: self.max_limit,
        }
    }
}
