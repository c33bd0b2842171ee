//! Collection handles.
//!
//! A [`Collection`] binds a collection name to a backend reference. Handles are cheap and are
//! obtained per request from [`DocumentStore::collection`](crate::store::DocumentStore::collection);
//! nothing about them is cached between requests.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//!
//! # async fn example(store: &patternstore_core::store::DocumentStore<impl patternstore_core::backend::StoreBackend>) -> patternstore_core::error::DocumentStoreResult<()> {
//! let users = store.collection("users");
//! let ids = users.insert(vec![doc! { "name": "Alice" }]).await?;
//! let alice = users.find_one(doc! { "_id": ids[0].clone() }).await?;
//! # Ok(()) }
//! ```

use bson::{Bson, Document};

use crate::{
    backend::StoreBackend,
    error::DocumentStoreResult,
    query::Query,
    update::{Update, UpdateStats},
};

/// A named collection with a reference to a storage backend.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    /// Creates a new collection reference (internal use).
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts documents and returns their identifiers in input order.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the operation fails,
    /// including when a document reuses an existing `_id`.
    pub async fn insert(&self, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
        self.backend
            .insert_documents(documents, self.name())
            .await
    }

    /// Runs a windowed query against the collection.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the filter is not
    /// understood by the backend or the operation fails.
    pub async fn find(&self, query: Query) -> DocumentStoreResult<Vec<Document>> {
        self.backend
            .find_documents(query, self.name())
            .await
    }

    /// Returns the first document matching `filter`.
    pub async fn find_one(&self, filter: Document) -> DocumentStoreResult<Option<Document>> {
        self.backend
            .find_document(filter, self.name())
            .await
    }

    /// Counts the documents matching `filter`.
    pub async fn count(&self, filter: Document) -> DocumentStoreResult<u64> {
        self.backend
            .count_documents(filter, self.name())
            .await
    }

    /// Applies `update` to every document matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `filter` - Selects the documents to update
    /// * `update` - Operators to apply, or a replacement body
    /// * `upsert` - Insert a document when nothing matches
    pub async fn update(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateStats> {
        self.backend
            .update_documents(filter, update, upsert, self.name())
            .await
    }

    /// Atomically updates the first document matching `filter` and returns its new state.
    pub async fn find_and_update(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
    ) -> DocumentStoreResult<Option<Document>> {
        self.backend
            .find_and_update_document(filter, update, upsert, self.name())
            .await
    }

    /// Updates every document matching `filter` and returns the first of them after the update.
    pub async fn update_returning_first(
        &self,
        filter: Document,
        update: Update,
    ) -> DocumentStoreResult<Option<Document>> {
        self.backend
            .update_returning_first(filter, update, self.name())
            .await
    }

    /// Deletes every document matching `filter`, returning the number deleted.
    pub async fn delete(&self, filter: Document) -> DocumentStoreResult<u64> {
        self.backend
            .delete_documents(filter, self.name())
            .await
    }

    /// Atomically deletes the first document matching `filter` and returns it.
    pub async fn find_and_delete(&self, filter: Document) -> DocumentStoreResult<Option<Document>> {
        self.backend
            .find_and_delete_document(filter, self.name())
            .await
    }

    /// Drops the whole collection.
    pub async fn drop(&self) -> DocumentStoreResult<()> {
        self.backend.drop_collection(self.name()).await
    }
}
