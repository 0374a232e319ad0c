//! Persistence collaborator for room snapshots.
//!
//! Snapshots are opaque MessagePack blobs to the store. A room is encoded in full before
//! `set` is called, so a write either replaces the whole snapshot or nothing.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use tradewinds_core::RoomState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("snapshot decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    /// `None` when the key expired or never existed.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, snapshot: Vec<u8>) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    /// Keys matching a glob where `*` matches any run of characters.
    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

/// In-process fallback store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, snapshot: Vec<u8>) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), snapshot);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

pub fn encode_room(room: &RoomState) -> Result<Vec<u8>, StoreError> {
    Ok(rmp_serde::to_vec_named(room)?)
}

pub fn decode_room(bytes: &[u8]) -> Result<RoomState, StoreError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // no wildcard at all
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
