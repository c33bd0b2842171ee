use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, Bson, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, ReturnDocument},
};
use patternstore_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::Query,
    update::{Update, UpdateStats},
};

const LOG_TARGET: &str = "patternstore::mongodb";


#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    /// Replaces every matched document one by one, keeping each `_id`, or inserts the
    /// replacement when nothing matched and `upsert` is set.
    async fn replace_documents(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateStats> {
        let collection = self.get_collection(collection);
        let ids = collection
            .find(filter.clone())
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .into_iter()
            .filter_map(|document| document.get("_id").cloned())
            .collect::<Vec<Bson>>();

        if ids.is_empty() {
            let result = collection
                .replace_one(filter, replacement)
                .upsert(upsert)
                .await
                .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

            return Ok(UpdateStats {
                matched: result.matched_count,
                modified: result.modified_count,
                upserted_id: result.upserted_id,
            });
        }

        let mut stats = UpdateStats::default();

        for id in ids {
            let result = collection
                .replace_one(doc! { "_id": id }, replacement.clone())
                .await
                .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

            stats.matched += result.matched_count;
            stats.modified += result.modified_count;
        }

        Ok(stats)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let result = self.get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        let mut ids = result.inserted_ids.into_iter().collect::<Vec<_>>();
        ids.sort_by_key(|(index, _)| *index);

        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn find_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let collection = self.get_collection(collection);
        let mut find = collection.find(query.filter);

        if let Some(skip) = query.offset {
            find = find.skip(skip);
        }
        if let Some(limit) = query.limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        find
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn find_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn update_documents(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateStats> {
        match update {
            Update::Operators(operators) => {
                let result = self.get_collection(collection)
                    .update_many(filter, operators)
                    .upsert(upsert)
                    .await
                    .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

                Ok(UpdateStats {
                    matched: result.matched_count,
                    modified: result.modified_count,
                    upserted_id: result.upserted_id,
                })
            }
            Update::Replacement(replacement) => {
                self.replace_documents(filter, replacement, upsert, collection).await
            }
        }
    }

    async fn find_and_update_document(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        match update {
            Update::Operators(operators) => self.get_collection(collection)
                .find_one_and_update(filter, operators)
                .return_document(ReturnDocument::After)
                .upsert(upsert)
                .await
                .map_err(|e| DocumentStoreError::Backend(e.to_string())),
            Update::Replacement(replacement) => self.get_collection(collection)
                .find_one_and_replace(filter, replacement)
                .return_document(ReturnDocument::After)
                .upsert(upsert)
                .await
                .map_err(|e| DocumentStoreError::Backend(e.to_string())),
        }
    }

    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_many(filter)
                .await
                .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
                .deleted_count
        )
    }

    async fn find_and_delete_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one_and_delete(filter)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        MongoDbStore::shutdown(self).await
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let client = Client::with_options(
            ClientOptions::parse(&self.dsn)
                .await
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        )
        .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        tracing::info!(
            target: LOG_TARGET,
            database = %self.database,
            "Connected to MongoDB"
        );

        Ok(MongoDbStore::new(client, self.database))
    }
}
