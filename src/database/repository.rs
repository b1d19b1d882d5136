//! Typed repositories over a document store

use super::{Collection, DocumentStore, StoredDocument};
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// A record that lives in a collection
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn id(&self) -> String;

    /// Secondary lookup key (wallet address, tx hash, match id, ...)
    fn key(&self) -> Option<String> {
        None
    }
}

/// Repository for one document type
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<T: Document> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    fn to_stored(doc: &T) -> Result<StoredDocument> {
        Ok(StoredDocument {
            id: doc.id(),
            key: doc.key(),
            body: serde_json::to_value(doc)?,
        })
    }

    fn decode_all(values: Vec<serde_json::Value>) -> Result<Vec<T>> {
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect()
    }

    /// Insert a new record; duplicate ids or unique keys are a conflict
    pub async fn insert(&self, doc: &T) -> Result<()> {
        self.store.insert(T::COLLECTION, Self::to_stored(doc)?).await
    }

    pub async fn save(&self, doc: &T) -> Result<()> {
        self.store.upsert(T::COLLECTION, Self::to_stored(doc)?).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_key(&self, key: &str) -> Result<Vec<T>> {
        Self::decode_all(self.store.find_by_key(T::COLLECTION, key).await?)
    }

    pub async fn find_one_by_key(&self, key: &str) -> Result<Option<T>> {
        Ok(self.find_by_key(key).await?.into_iter().next())
    }

    pub async fn list(&self) -> Result<Vec<T>> {
        Self::decode_all(self.store.list(T::COLLECTION).await?)
    }
}
