//! In-memory storage implementation for document stores.
//!
//! Collections are vectors of BSON documents kept in insertion order, guarded by a single
//! async-aware read-write lock. Every filter is evaluated by a full scan.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document};

use patternstore_core::{
    query::Query,
    error::{DocumentStoreError, DocumentStoreResult},
    backend::{StoreBackend, StoreBackendBuilder},
    update::{Update, UpdateStats},
};

use crate::{
    evaluator::Filter,
    update::{apply, upserted, with_id},
};

type StoreMap = HashMap<String, Vec<Document>>;

const LOG_TARGET: &str = "patternstore::memory";

/// Thread-safe in-memory document storage backend.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data. Writes hold the lock for their whole duration, so
/// find-and-modify operations are atomic.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). For small to medium
/// datasets this is typically acceptable. For larger datasets, use the MongoDB backend.
///
/// # Example
///
/// ```ignore
/// use patternstore_memory::InMemoryStore;
/// use patternstore_core::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     let ids = store.insert_documents(vec![doc! { "name": "Alice", "age": 30 }], "users").await?;
///     let alice = store.find_document(doc! { "_id": ids[0].clone() }, "users").await?;
///     assert!(alice.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use patternstore_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn position(documents: &[Document], filter: &Filter) -> DocumentStoreResult<Option<usize>> {
    for (index, document) in documents.iter().enumerate() {
        if filter.matches(document)? {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

fn id_of(document: &Document) -> DocumentStoreResult<Bson> {
    document
        .get("_id")
        .cloned()
        .ok_or_else(|| DocumentStoreError::InvalidDocument("document has no _id".into()))
}

fn ensure_unique(documents: &[Document], id: &Bson, collection: &str) -> DocumentStoreResult<()> {
    if documents.iter().any(|document| document.get("_id") == Some(id)) {
        return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
    }

    Ok(())
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let mut store = self.store.write().await;
        let existing = store
            .entry(collection.to_string())
            .or_default();

        // Validate the whole batch before writing any of it.
        let mut pending = Vec::with_capacity(documents.len());
        let mut ids = Vec::with_capacity(documents.len());

        for document in documents {
            let document = with_id(document);
            let id = id_of(&document)?;

            ensure_unique(existing, &id, collection)?;
            ensure_unique(&pending, &id, collection)?;

            ids.push(id);
            pending.push(document);
        }

        existing.extend(pending);

        Ok(ids)
    }

    async fn find_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let filter = Filter::new(&query.filter)?;
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        Ok(
            filter
                .filter_documents(documents)?
                .into_iter()
                .skip(query.offset.unwrap_or(0) as usize)
                .take(query.limit.map_or(usize::MAX, |limit| limit as usize))
                .cloned()
                .collect()
        )
    }

    async fn find_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let filter = Filter::new(&filter)?;
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(col) => col,
            None => return Ok(None),
        };

        Ok(position(documents, &filter)?.map(|index| documents[index].clone()))
    }

    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        let filter = Filter::new(&filter)?;
        let store = self.store.read().await;

        match store.get(collection) {
            Some(documents) => Ok(filter.filter_documents(documents)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn update_documents(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateStats> {
        let filter = Filter::new(&filter)?;
        let mut store = self.store.write().await;
        let documents = store
            .entry(collection.to_string())
            .or_default();

        let mut stats = UpdateStats::default();
        // Apply to copies so a failing document leaves the collection untouched.
        let mut updated = documents.clone();

        for document in updated.iter_mut() {
            if filter.matches(document)? {
                stats.matched += 1;

                if apply(document, &update, false)? {
                    stats.modified += 1;
                }
            }
        }

        if stats.matched == 0 && upsert {
            let document = upserted(filter.equalities(), &update)?;
            let id = id_of(&document)?;

            tracing::debug!(
                target: LOG_TARGET,
                collection,
                id = %id,
                "Upserted document"
            );

            updated.push(document);
            stats.upserted_id = Some(id);
        }

        *documents = updated;

        Ok(stats)
    }

    async fn find_and_update_document(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let filter = Filter::new(&filter)?;
        let mut store = self.store.write().await;
        let documents = store
            .entry(collection.to_string())
            .or_default();

        match position(documents, &filter)? {
            Some(index) => {
                let mut document = documents[index].clone();
                apply(&mut document, &update, false)?;
                documents[index] = document.clone();

                Ok(Some(document))
            }
            None if upsert => {
                let document = upserted(filter.equalities(), &update)?;
                documents.push(document.clone());

                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    async fn update_returning_first(
        &self,
        filter: Document,
        update: Update,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let filter = Filter::new(&filter)?;
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(None);
        };

        // Nothing is committed unless every match takes the update.
        let mut updated = documents.clone();
        let mut first = None;

        for document in updated.iter_mut() {
            if filter.matches(document)? {
                apply(document, &update, false)?;
                first.get_or_insert_with(|| document.clone());
            }
        }

        if first.is_some() {
            *documents = updated;
        }

        Ok(first)
    }

    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        let filter = Filter::new(&filter)?;
        let mut store = self.store.write().await;
        let documents = match store.get_mut(collection) {
            Some(col) => col,
            None => return Ok(0),
        };

        let doomed = documents
            .iter()
            .map(|document| filter.matches(document))
            .collect::<DocumentStoreResult<Vec<_>>>()?;
        let mut flags = doomed.iter();

        documents.retain(|_| !flags.next().copied().unwrap_or(false));

        Ok(doomed.into_iter().filter(|doomed| *doomed).count() as u64)
    }

    async fn find_and_delete_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let filter = Filter::new(&filter)?;
        let mut store = self.store.write().await;
        let documents = match store.get_mut(collection) {
            Some(col) => col,
            None => return Ok(None),
        };

        Ok(position(documents, &filter)?.map(|index| documents.remove(index)))
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store.write().await.remove(name);

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use patternstore_memory::InMemoryStore;
/// use patternstore_core::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    seed: Vec<(String, Vec<Document>)>,
}

impl InMemoryStoreBuilder {
    /// Preloads a collection with documents. Documents without an `_id` get one.
    pub fn with_documents(mut self, collection: impl Into<String>, documents: Vec<Document>) -> Self {
        self.seed.push((collection.into(), documents));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// # Errors
    ///
    /// Fails if preloaded documents repeat an `_id` within a collection.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = InMemoryStore::new();

        for (collection, documents) in self.seed {
            store.insert_documents(documents, &collection).await?;
        }

        Ok(store)
    }
}
