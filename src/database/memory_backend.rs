//! In-memory document store

use super::{Collection, DocumentStore, StoredDocument};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

struct Entry {
    seq: u64,
    key: Option<String>,
    body: Value,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    collections: HashMap<Collection, HashMap<String, Entry>>,
}

/// Process-local document store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_taken(docs: &HashMap<String, Entry>, key: &str, id: &str) -> bool {
        docs.iter()
            .any(|(other_id, entry)| other_id != id && entry.key.as_deref() == Some(key))
    }

    fn sorted(entries: Vec<&Entry>) -> Vec<Value> {
        let mut entries = entries;
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.body.clone()).collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: Collection, doc: StoredDocument) -> Result<()> {
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        let docs = inner.collections.entry(collection).or_default();

        if docs.contains_key(&doc.id) {
            return Err(Error::Conflict(format!(
                "Duplicate {} document {}",
                collection.name(),
                doc.id
            )));
        }
        if let (true, Some(key)) = (collection.has_unique_key(), doc.key.as_deref()) {
            if Self::key_taken(docs, key, &doc.id) {
                return Err(Error::Conflict(format!("Duplicate {} key {}", collection.name(), key)));
            }
        }

        docs.insert(
            doc.id,
            Entry {
                seq,
                key: doc.key,
                body: doc.body,
            },
        );
        inner.next_seq += 1;
        Ok(())
    }

    async fn upsert(&self, collection: Collection, doc: StoredDocument) -> Result<()> {
        let mut inner = self.inner.write();
        let next_seq = inner.next_seq;
        let docs = inner.collections.entry(collection).or_default();

        if let (true, Some(key)) = (collection.has_unique_key(), doc.key.as_deref()) {
            if Self::key_taken(docs, key, &doc.id) {
                return Err(Error::Conflict(format!("Duplicate {} key {}", collection.name(), key)));
            }
        }

        let inserted = match docs.get_mut(&doc.id) {
            Some(entry) => {
                entry.key = doc.key;
                entry.body = doc.body;
                false
            }
            None => {
                docs.insert(
                    doc.id,
                    Entry {
                        seq: next_seq,
                        key: doc.key,
                        body: doc.body,
                    },
                );
                true
            }
        };
        if inserted {
            inner.next_seq += 1;
        }
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let inner = self.inner.read();
        Ok(inner
            .collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .map(|entry| entry.body.clone()))
    }

    async fn find_by_key(&self, collection: Collection, key: &str) -> Result<Vec<Value>> {
        let inner = self.inner.read();
        let entries = inner
            .collections
            .get(&collection)
            .map(|docs| {
                docs.values()
                    .filter(|e| e.key.as_deref() == Some(key))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(Self::sorted(entries))
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Value>> {
        let inner = self.inner.read();
        let entries = inner
            .collections
            .get(&collection)
            .map(|docs| docs.values().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(Self::sorted(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, key: Option<&str>, n: i64) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            key: key.map(str::to_string),
            body: json!({ "id": id, "n": n }),
        }
    }

    #[tokio::test]
    async fn test_unique_keys_enforced() {
        let store = MemoryStore::new();
        store.insert(Collection::Payments, doc("p1", Some("0xabc"), 1)).await.unwrap();

        let err = store
            .insert(Collection::Payments, doc("p2", Some("0xabc"), 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // non-unique collections allow shared keys
        store.insert(Collection::Bets, doc("b1", Some("m1"), 1)).await.unwrap();
        store.insert(Collection::Bets, doc("b2", Some("m1"), 2)).await.unwrap();
        assert_eq!(store.find_by_key(Collection::Bets, "m1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_keeps_order() {
        let store = MemoryStore::new();
        store.upsert(Collection::Matches, doc("a", Some("waiting"), 1)).await.unwrap();
        store.upsert(Collection::Matches, doc("b", Some("waiting"), 2)).await.unwrap();
        store.upsert(Collection::Matches, doc("a", Some("active"), 3)).await.unwrap();

        let all = store.list(Collection::Matches).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["id"], "a");
        assert_eq!(all[0]["n"], 3);

        let waiting = store.find_by_key(Collection::Matches, "waiting").await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0]["id"], "b");
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_on_insert() {
        let store = MemoryStore::new();
        store.insert(Collection::Users, doc("u1", Some("0x1"), 1)).await.unwrap();
        assert!(store.insert(Collection::Users, doc("u1", Some("0x2"), 1)).await.is_err());
        assert!(store.get(Collection::Users, "u1").await.unwrap().is_some());
        assert!(store.get(Collection::Users, "nope").await.unwrap().is_none());
    }
}
