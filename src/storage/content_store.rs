// src/storage/content_store.rs
//! Content-addressed byte storage.

use crate::error::Result;
use async_trait::async_trait;

/// A content-addressed store: `put` returns the hash `get` accepts.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `data` and returns its content hash.
    async fn put(&self, data: &[u8]) -> Result<String>;

    /// Fetches the bytes stored under `hash`.
    ///
    /// # Errors
    /// [`DidError::Storage`](crate::error::DidError::Storage) if the hash is
    /// unknown or the store is unreachable.
    async fn get(&self, hash: &str) -> Result<Vec<u8>>;
}
