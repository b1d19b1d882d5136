//! SQLite backend
//!
//! All collections share one `documents` table. Rows keep an autoincrement
//! sequence so listings come back in insertion order, and a partial unique
//! index enforces unique secondary keys for users and payments.

use super::{Collection, DocumentStore, StoredDocument};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        doc_key TEXT,
        body TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE(collection, id)
    );
    CREATE INDEX IF NOT EXISTS idx_documents_key ON documents(collection, doc_key);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_unique_key
        ON documents(collection, doc_key)
        WHERE collection IN ('users', 'payments');
";

/// Single-connection SQLite document store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("sqlite schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_connection<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::Internal(format!("database task failed: {}", e)))?
    }
}

fn map_write_error(collection: Collection, err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Error::Conflict(format!("Duplicate {} document", collection.name()))
        }
        _ => Error::Database(err.to_string()),
    }
}

fn parse_rows(rows: Vec<String>) -> Result<Vec<Value>> {
    rows.iter()
        .map(|body| serde_json::from_str(body).map_err(Error::from))
        .collect()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, collection: Collection, doc: StoredDocument) -> Result<()> {
        let body = serde_json::to_string(&doc.body)?;
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, doc_key, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    collection.name(),
                    doc.id,
                    doc.key,
                    body,
                    chrono::Utc::now().timestamp()
                ],
            )
            .map_err(|e| map_write_error(collection, e))?;
            Ok(())
        })
        .await
    }

    async fn upsert(&self, collection: Collection, doc: StoredDocument) -> Result<()> {
        let body = serde_json::to_string(&doc.body)?;
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, doc_key, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    doc_key = excluded.doc_key,
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![
                    collection.name(),
                    doc.id,
                    doc.key,
                    body,
                    chrono::Utc::now().timestamp()
                ],
            )
            .map_err(|e| map_write_error(collection, e))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let id = id.to_string();
        let body: Option<String> = self
            .with_connection(move |conn| {
                let body = conn
                    .query_row(
                        "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                        params![collection.name(), id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(body)
            })
            .await?;

        body.map(|b| serde_json::from_str(&b).map_err(Error::from))
            .transpose()
    }

    async fn find_by_key(&self, collection: Collection, key: &str) -> Result<Vec<Value>> {
        let key = key.to_string();
        let rows = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT body FROM documents
                     WHERE collection = ?1 AND doc_key = ?2 ORDER BY seq",
                )?;
                let rows = stmt
                    .query_map(params![collection.name(), key], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await?;
        parse_rows(rows)
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Value>> {
        let rows = self
            .with_connection(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY seq")?;
                let rows = stmt
                    .query_map(params![collection.name()], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await?;
        parse_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(id: &str, key: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            key: Some(key.to_string()),
            body: json!({ "id": id, "key": key }),
        }
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("gamehub.db");

        {
            let store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
            store.insert(Collection::Users, doc("u1", "0xaa")).await.unwrap();
            store.upsert(Collection::Matches, doc("m1", "waiting")).await.unwrap();
        }

        let store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
        let user = store.get(Collection::Users, "u1").await.unwrap().unwrap();
        assert_eq!(user["key"], "0xaa");
        assert_eq!(store.list(Collection::Matches).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unique_key_conflicts() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(Collection::Payments, doc("p1", "0xtx")).await.unwrap();

        let err = store.insert(Collection::Payments, doc("p2", "0xtx")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = store.upsert(Collection::Payments, doc("p3", "0xtx")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // bets share match ids as keys
        store.insert(Collection::Bets, doc("b1", "m1")).await.unwrap();
        store.insert(Collection::Bets, doc("b2", "m1")).await.unwrap();
        let bets = store.find_by_key(Collection::Bets, "m1").await.unwrap();
        assert_eq!(bets.len(), 2);
        assert_eq!(bets[0]["id"], "b1");
    }

    #[tokio::test]
    async fn test_upsert_updates_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(Collection::Matches, doc("m1", "waiting")).await.unwrap();
        store.upsert(Collection::Matches, doc("m1", "active")).await.unwrap();

        assert!(store.find_by_key(Collection::Matches, "waiting").await.unwrap().is_empty());
        assert_eq!(store.find_by_key(Collection::Matches, "active").await.unwrap().len(), 1);
    }
}
