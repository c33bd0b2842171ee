//! Deserializable configuration for assembling a processor.
//!
//! ```ignore
//! use patternstore::config::StoreConfig;
//!
//! let config = StoreConfig::from_json(r#"{
//!     "backend": { "type": "mongodb", "url": "mongodb://localhost:27017", "database": "test" },
//!     "max_limit": 100
//! }"#)?;
//!
//! let processor = config.build_processor().await?;
//! ```

use serde::{Deserialize, Serialize};

use patternstore_core::{
    backend::{DynStoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    processor::{DEFAULT_TOPIC, PatternProcessor},
};
use patternstore_memory::InMemoryStore;

const LOG_TARGET: &str = "patternstore::config";

/// Which storage backend to connect to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    Memory,
    #[cfg(feature = "mongodb")]
    Mongodb {
        /// Connection string, e.g. `mongodb://localhost:27017`.
        url: String,
        database: String,
    },
}

impl BackendConfig {
    /// Connects to the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] if the connection cannot be set up.
    pub async fn connect(&self) -> DocumentStoreResult<Box<dyn DynStoreBackend>> {
        match self {
            BackendConfig::Memory => Ok(Box::new(InMemoryStore::builder().build().await?)),
            #[cfg(feature = "mongodb")]
            BackendConfig::Mongodb { url, database } => Ok(Box::new(
                patternstore_mongodb::MongoDbStore::builder(url, database)
                    .build()
                    .await?,
            )),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            #[cfg(feature = "mongodb")]
            BackendConfig::Mongodb { .. } => "mongodb",
        }
    }
}

/// Settings for a [`PatternProcessor`] and its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Topic the processor answers on.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Ceiling for `find` limits; also the limit when a request gives none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_limit: Option<u64>,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            topic: default_topic(),
            max_limit: None,
        }
    }
}

impl StoreConfig {
    /// Parses a configuration from JSON text. Missing fields take their defaults.
    pub fn from_json(text: &str) -> DocumentStoreResult<Self> {
        serde_json::from_str(text).map_err(|e| DocumentStoreError::Initialization(e.to_string()))
    }

    /// Connects the backend and wraps it in a configured processor.
    pub async fn build_processor(&self) -> DocumentStoreResult<PatternProcessor<Box<dyn DynStoreBackend>>> {
        let backend = self.backend.connect().await?;

        tracing::info!(
            target: LOG_TARGET,
            backend = self.backend.name(),
            topic = %self.topic,
            max_limit = ?self.max_limit,
            "Pattern processor ready"
        );

        let mut builder = PatternProcessor::builder(backend).topic(self.topic.clone());

        if let Some(max_limit) = self.max_limit {
            builder = builder.max_limit(max_limit);
        }

        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_takes_defaults() {
        let config = StoreConfig::from_json("{}").unwrap();

        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.topic, "mongo-store");
        assert_eq!(config.backend, BackendConfig::Memory);
    }

    #[test]
    fn reads_every_field() {
        let config = StoreConfig::from_json(r#"{ "backend": { "type": "memory" }, "topic": "docs", "max_limit": 25 }"#).unwrap();

        assert_eq!(config.topic, "docs");
        assert_eq!(config.max_limit, Some(25));
    }

    #[test]
    fn rejects_unknown_backends() {
        let err = StoreConfig::from_json(r#"{ "backend": { "type": "couchdb" } }"#).unwrap_err();

        assert!(matches!(err, DocumentStoreError::Initialization(_)));
    }

    #[tokio::test]
    async fn builds_a_configured_processor() {
        let processor = StoreConfig::from_json(r#"{ "topic": "docs", "max_limit": 5 }"#)
            .unwrap()
            .build_processor()
            .await
            .unwrap();

        assert_eq!(processor.topic(), "docs");
        assert_eq!(processor.max_limit(), Some(5));
    }
}
