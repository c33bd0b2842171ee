//! The store wrapper the processor routes through.
//!
//! [`DocumentStore`] owns the injected backend and hands out name-bound [`Collection`]
//! handles, one per request. When the engine is picked at runtime the store is held over a
//! boxed [`DynStoreBackend`]; [`DocumentStore::into_dyn`] erases a concrete backend and
//! [`DocumentStore::into_static`] recovers it.
//!
//! # Example
//!
//! ```ignore
//! use patternstore_core::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! let users = store.collection("users");
//! let adults = users.count(doc! { "age": { "$gte": 18 } }).await?;
//! ```

use crate::{
    backend::{DynStoreBackend, StoreBackend},
    collection::Collection,
    error::DocumentStoreResult,
};

/// Owns a backend; collections are borrowed from it.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> DocumentStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// A handle on the collection called `name`. Nothing is created until a write lands in it.
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, B> {
        Collection::new(name.to_string(), &self.backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Drops the collection called `name`. Dropping a collection that does not exist succeeds.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Names of the collections the backend currently holds. Not reachable from a pattern.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Consumes the store and releases the backend's connections.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

impl<B: StoreBackend + 'static> DocumentStore<B> {
    pub fn into_dyn(self) -> DocumentStore<Box<dyn DynStoreBackend>> {
        DocumentStore::new(Box::new(self.backend))
    }
}

impl DocumentStore<Box<dyn DynStoreBackend>> {
    /// Takes the boxed backend back out as a `B`, or `None` if it is some other backend.
    pub fn into_static<B>(self) -> Option<DocumentStore<B>>
    where
        B: StoreBackend + 'static,
    {
        DynStoreBackend::into_any(self.backend)
            .downcast::<B>()
            .ok()
            .map(|backend| DocumentStore::new(*backend))
    }

    /// Borrows the boxed backend as a `B`, or `None` if it is some other backend.
    pub fn as_static<B>(&self) -> Option<DocumentStore<&B>>
    where
        B: StoreBackend + 'static,
    {
        DynStoreBackend::as_any(&*self.backend)
            .downcast_ref::<B>()
            .map(DocumentStore::new)
    }
}
