//! Document persistence
//!
//! Records are stored as JSON documents grouped into collections. Each
//! document has an id and an optional secondary key; users (wallet address)
//! and payments (transaction hash) require that key to be unique, which is
//! what makes "register once" and "credit a transaction once" hold even
//! under concurrent requests.
//!
//! Backends:
//! - `memory_backend`: process-local, used by tests and ephemeral deployments
//! - `sqlite_backend`: single-file SQLite (feature `sqlite`)

pub mod locks;
pub mod memory_backend;
pub mod repository;
#[cfg(feature = "sqlite")]
pub mod sqlite_backend;

pub use locks::KeyedLocks;
pub use memory_backend::MemoryStore;
pub use repository::{Document, Repository};
#[cfg(feature = "sqlite")]
pub use sqlite_backend::SqliteStore;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Document collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Matches,
    Bets,
    Payments,
    Sessions,
    GameStats,
    Leaderboards,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Users,
        Collection::Matches,
        Collection::Bets,
        Collection::Payments,
        Collection::Sessions,
        Collection::GameStats,
        Collection::Leaderboards,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Matches => "matches",
            Collection::Bets => "bets",
            Collection::Payments => "payments",
            Collection::Sessions => "sessions",
            Collection::GameStats => "game_stats",
            Collection::Leaderboards => "leaderboards",
        }
    }

    /// Collections whose secondary key must be unique
    pub fn has_unique_key(&self) -> bool {
        matches!(self, Collection::Users | Collection::Payments)
    }
}

/// A serialized record ready for storage
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub key: Option<String>,
    pub body: Value,
}

/// Storage backend for JSON documents
///
/// Listing operations return documents in insertion order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails with `Error::Conflict` if the id, or a
    /// unique secondary key, already exists.
    async fn insert(&self, collection: Collection, doc: StoredDocument) -> Result<()>;

    /// Insert or replace a document by id. Fails with `Error::Conflict` if a
    /// unique secondary key belongs to a different document.
    async fn upsert(&self, collection: Collection, doc: StoredDocument) -> Result<()>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>>;

    async fn find_by_key(&self, collection: Collection, key: &str) -> Result<Vec<Value>>;

    async fn list(&self, collection: Collection) -> Result<Vec<Value>>;
}

/// Open the backend named by `config.url` (`memory` or `sqlite://<path>`)
pub fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn DocumentStore>> {
    if config.url == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }

    if let Some(path) = config.url.strip_prefix("sqlite://") {
        #[cfg(feature = "sqlite")]
        {
            let store = if path == ":memory:" {
                SqliteStore::open_in_memory()?
            } else {
                SqliteStore::open(std::path::Path::new(path), config.busy_timeout)?
            };
            return Ok(Arc::new(store));
        }

        #[cfg(not(feature = "sqlite"))]
        {
            let _ = path;
            return Err(Error::Config(
                "sqlite database requested but the `sqlite` feature is disabled".to_string(),
            ));
        }
    }

    Err(Error::Config(format!("Unsupported database url: {}", config.url)))
}
