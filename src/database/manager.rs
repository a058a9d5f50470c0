use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::memory::MemoryStore;
use super::mongo::MongoStore;
use super::store::{DocumentStore, StoreError};
use crate::types::Collection;

/// Errors from ConnectionManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to establish database connection: {0}")]
    ConnectionError(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cheaply cloneable handle to an established database
#[derive(Clone)]
pub struct Connection {
    database: String,
    store: Arc<dyn DocumentStore>,
}

impl Connection {
    pub fn new(database: impl Into<String>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            database: database.into(),
            store,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Performs the (slow, fallible) establishment of a database connection
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection, StoreError>;
}

/// Connects according to a connection string.
///
/// - `memory://<database>`: volatile in-process store
/// - `file:///<path>`: in-process store snapshotted to `<path>`
/// - `mongodb://...`, `mongodb+srv://...`: MongoDB deployment
pub struct UrlConnector {
    url: String,
}

impl UrlConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for UrlConnector {
    async fn connect(&self) -> Result<Connection, StoreError> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| StoreError::InvalidConnectionString(e.to_string()))?;

        match url.scheme() {
            "memory" => {
                let database = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .unwrap_or("moviemasterdb")
                    .to_string();
                let store = MemoryStore::new(database.clone());
                Ok(Connection::new(database, Arc::new(store)))
            }
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    StoreError::InvalidConnectionString(format!("not a file path: {}", self.url))
                })?;
                let store = MemoryStore::open(path).await?;
                Ok(Connection::new(store.name().to_string(), Arc::new(store)))
            }
            "mongodb" | "mongodb+srv" => {
                let store = MongoStore::connect(&self.url).await?;
                Ok(Connection::new(store.name().to_string(), Arc::new(store)))
            }
            other => Err(StoreError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Owns the single lazily-established database connection.
///
/// The first successful `get()` caches the connection for the life of the
/// manager. Concurrent first callers share one establishment attempt; a
/// failed attempt is not cached and the next call starts over.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    connection: OnceCell<Connection>,
}

impl ConnectionManager {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            connection: OnceCell::new(),
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self::new(UrlConnector::new(url))
    }

    /// Get the shared connection, establishing it on first use
    pub async fn get(&self) -> Result<Connection, DatabaseError> {
        self.connection
            .get_or_try_init(|| self.establish())
            .await
            .cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    async fn establish(&self) -> Result<Connection, DatabaseError> {
        let connection = self.connector.connect().await.map_err(|e| {
            warn!("Database connection attempt failed: {}", e);
            DatabaseError::ConnectionError(e)
        })?;

        Self::prepare(&connection).await?;

        info!("Connected to database: {}", connection.database());
        Ok(connection)
    }

    /// Indexes the handlers rely on
    async fn prepare(connection: &Connection) -> Result<(), DatabaseError> {
        connection
            .store()
            .create_unique_index(Collection::WatchList.name(), &["addedBy", "movieId"])
            .await
            .map_err(DatabaseError::ConnectionError)
    }

    /// Pings the store, connecting first if needed
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        let connection = self.get().await?;
        connection.store().ping().await?;
        Ok(())
    }
}
