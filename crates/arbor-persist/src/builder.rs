use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PersistError, Result};
use crate::memory::MemoryStore;
use crate::store::MessageStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    MongoDb,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => f.write_str("memory"),
            StoreBackend::MongoDb => f.write_str("mongodb"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = PersistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "mongodb" | "mongo" => Ok(StoreBackend::MongoDb),
            other => Err(PersistError::Internal(format!("unknown storage backend: {other}"))),
        }
    }
}

/// Builds the configured [`MessageStore`] behind a trait object.
pub struct StoreBuilder {
    backend: StoreBackend,
    mongodb_uri: Option<String>,
    database: Option<String>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            backend: StoreBackend::Memory,
            mongodb_uri: None,
            database: None,
        }
    }

    pub fn backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn mongodb_uri(mut self, uri: impl Into<String>) -> Self {
        self.mongodb_uri = Some(uri.into());
        self
    }

    pub fn database(mut self, db: impl Into<String>) -> Self {
        self.database = Some(db.into());
        self
    }

    pub async fn build(self) -> Result<Arc<dyn MessageStore>> {
        match self.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::MongoDb => self.build_mongo().await,
        }
    }

    #[cfg(feature = "mongodb")]
    async fn build_mongo(self) -> Result<Arc<dyn MessageStore>> {
        let uri = self
            .mongodb_uri
            .ok_or_else(|| PersistError::Connection("mongodb_uri is required".to_string()))?;
        let database = self
            .database
            .ok_or_else(|| PersistError::Connection("database is required".to_string()))?;

        let store = crate::dbs::mongo::MongoMessageStore::connect(&uri, &database).await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "mongodb"))]
    async fn build_mongo(self) -> Result<Arc<dyn MessageStore>> {
        Err(PersistError::Connection(
            "arbor-persist was built without the `mongodb` feature".to_string(),
        ))
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
