//! Storage backend abstraction for the command processor.
//!
//! This module defines the capability set the processor consumes from a document database:
//! create, find, count, update, replace and remove, each addressed by a collection name and a
//! filter document. The database engine itself is out of scope; implementations adapt an
//! engine (in-memory, MongoDB, ...) to this interface.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`DynStoreBackend`]: A trait for dynamic dispatch over backend implementations
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use patternstore_core::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! let ids = backend.insert_documents(vec![doc! { "name": "Alice" }], "users").await?;
//! let alice = backend.find_document(doc! { "_id": ids[0].clone() }, "users").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use std::{any::Any, fmt::Debug};

use crate::{
    error::DocumentStoreResult,
    query::Query,
    update::{Update, UpdateStats},
};

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. No ordering is guaranteed between concurrent calls on the same collection.
///
/// # Identifiers
///
/// Documents are keyed by their `_id` field. Backends assign a fresh object id to inserted
/// documents that carry none.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult). Engine
/// failures are reported as [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend)
/// with the engine's own message.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts documents into a collection, creating it if needed.
    ///
    /// # Returns
    ///
    /// The `_id` of every inserted document, in input order.
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Returns the documents matching the query's filter, skipping `offset` documents and
    /// returning at most `limit`. The window is applied by the engine, before materialization.
    async fn find_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Returns the first document matching `filter`, if any.
    async fn find_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64>;

    /// Applies `update` to every document matching `filter`.
    ///
    /// With `upsert` set and no match, a new document is inserted, seeded from the equality
    /// conditions of the filter. A [`Update::Replacement`] replaces each matched document while
    /// keeping its `_id`.
    async fn update_documents(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateStats>;

    /// Atomically applies `update` to the first document matching `filter` and returns the
    /// document as it is after the update.
    ///
    /// Returns `None` when nothing matched and `upsert` is not set.
    async fn find_and_update_document(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Applies `update` to every document matching `filter` and returns the first match as it
    /// is after the update, or `None` when nothing matched.
    ///
    /// The default implementation updates the first match with
    /// [`find_and_update_document`](Self::find_and_update_document) and the others with
    /// [`update_documents`](Self::update_documents), so a failure in the second write leaves
    /// the first one in place. Backends that can run both as one write override it.
    async fn update_returning_first(
        &self,
        filter: Document,
        update: Update,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let Some(first) = self
            .find_and_update_document(filter.clone(), update.clone(), false, collection)
            .await?
        else {
            return Ok(None);
        };

        if let Some(id) = first.get("_id") {
            self.update_documents(excluding(filter, id), update, false, collection)
                .await?;
        }

        Ok(Some(first))
    }

    /// Deletes every document matching `filter` and returns how many were deleted.
    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64>;

    /// Atomically deletes the first document matching `filter` and returns it.
    async fn find_and_delete_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Drops (deletes) a collection and all its documents.
    ///
    /// Dropping a collection that does not exist is not an error.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the store.
    ///
    /// Store administration for embedding applications; no pattern command reaches it.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external connections
    /// should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        (*self)
            .insert_documents(documents, collection)
            .await
    }

    async fn find_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (*self)
            .find_documents(query, collection)
            .await
    }

    async fn find_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (*self)
            .find_document(filter, collection)
            .await
    }

    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        (*self)
            .count_documents(filter, collection)
            .await
    }

    async fn update_documents(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateStats> {
        (*self)
            .update_documents(filter, update, upsert, collection)
            .await
    }

    async fn find_and_update_document(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (*self)
            .find_and_update_document(filter, update, upsert, collection)
            .await
    }

    async fn update_returning_first(
        &self,
        filter: Document,
        update: Update,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (*self)
            .update_returning_first(filter, update, collection)
            .await
    }

    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        (*self)
            .delete_documents(filter, collection)
            .await
    }

    async fn find_and_delete_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        (*self)
            .find_and_delete_document(filter, collection)
            .await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (*self).drop_collection(name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        (*self).list_collections().await
    }
}

#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;
    async fn find_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;
    async fn find_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;
    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64>;
    async fn update_documents(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateStats>;
    async fn find_and_update_document(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;
    async fn update_returning_first(
        &self,
        filter: Document,
        update: Update,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;
    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64>;
    async fn find_and_delete_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;
    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()>;

    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

#[async_trait]
impl<B: StoreBackend + Send + Sync + 'static> DynStoreBackend for B {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        StoreBackend::insert_documents(self, documents, collection).await
    }

    async fn find_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        StoreBackend::find_documents(self, query, collection).await
    }

    async fn find_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        StoreBackend::find_document(self, filter, collection).await
    }

    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        StoreBackend::count_documents(self, filter, collection).await
    }

    async fn update_documents(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateStats> {
        StoreBackend::update_documents(self, filter, update, upsert, collection).await
    }

    async fn find_and_update_document(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        StoreBackend::find_and_update_document(self, filter, update, upsert, collection).await
    }

    async fn update_returning_first(
        &self,
        filter: Document,
        update: Update,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        StoreBackend::update_returning_first(self, filter, update, collection).await
    }

    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        StoreBackend::delete_documents(self, filter, collection).await
    }

    async fn find_and_delete_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        StoreBackend::find_and_delete_document(self, filter, collection).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        StoreBackend::drop_collection(self, name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        StoreBackend::list_collections(self).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A boxed dynamic backend is itself a backend, so runtime-selected engines can be used
/// wherever a [`StoreBackend`] is expected.
#[async_trait]
impl StoreBackend for Box<dyn DynStoreBackend> {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        DynStoreBackend::insert_documents(&**self, documents, collection).await
    }

    async fn find_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        DynStoreBackend::find_documents(&**self, query, collection).await
    }

    async fn find_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        DynStoreBackend::find_document(&**self, filter, collection).await
    }

    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        DynStoreBackend::count_documents(&**self, filter, collection).await
    }

    async fn update_documents(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateStats> {
        DynStoreBackend::update_documents(&**self, filter, update, upsert, collection).await
    }

    async fn find_and_update_document(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        DynStoreBackend::find_and_update_document(&**self, filter, update, upsert, collection).await
    }

    async fn update_returning_first(
        &self,
        filter: Document,
        update: Update,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        DynStoreBackend::update_returning_first(&**self, filter, update, collection).await
    }

    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        DynStoreBackend::delete_documents(&**self, filter, collection).await
    }

    async fn find_and_delete_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        DynStoreBackend::find_and_delete_document(&**self, filter, collection).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        DynStoreBackend::drop_collection(&**self, name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        DynStoreBackend::list_collections(&**self).await
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        DynStoreBackend::shutdown_boxed(self).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}

/// Narrows `filter` to the documents other than `id`.
fn excluding(filter: Document, id: &Bson) -> Document {
    let others = doc! { "_id": { "$ne": id.clone() } };

    if filter.is_empty() {
        others
    } else {
        doc! { "$and": [filter, others] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_keeps_the_original_filter() {
        let id = Bson::Int32(7);

        assert_eq!(excluding(Document::new(), &id), doc! { "_id": { "$ne": 7 } });
        assert_eq!(
            excluding(doc! { "name": "a" }, &id),
            doc! { "$and": [{ "name": "a" }, { "_id": { "$ne": 7 } }] }
        );
    }
}
