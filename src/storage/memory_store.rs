// src/storage/memory_store.rs
//! In-process [`ContentStore`] keyed by CIDv0-style hashes.

use crate::error::{DidError, Result};
use crate::storage::content_store::ContentStore;
use crate::utils::crypto::sha256;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Multihash prefix for a 32-byte SHA-256 digest.
const SHA256_MULTIHASH: [u8; 2] = [0x12, 0x20];

#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `Qm...` hash of `data`: base58 of the SHA-256 multihash.
pub fn content_hash(data: &[u8]) -> String {
    let mut multihash = SHA256_MULTIHASH.to_vec();
    multihash.extend_from_slice(&sha256(data));
    bs58::encode(multihash).into_string()
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, data: &[u8]) -> Result<String> {
        let hash = content_hash(data);
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash.clone(), data.to_vec());
        Ok(hash)
    }

    async fn get(&self, hash: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned()
            .ok_or_else(|| DidError::Storage(format!("no content stored under {}", hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_is_content_addressed() {
        let store = MemoryStore::new();
        let first = store.put(b"hello").await.unwrap();
        let second = store.put(b"hello").await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("Qm"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&first).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_unknown_hash() {
        let err = MemoryStore::new().get("QmMissing").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
