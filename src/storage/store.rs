// src/storage/store.rs
//! Typed JSON archive over any [`ContentStore`].
//!
//! Hashes can also be carried on-chain as 32-byte values: the `Qm...`
//! multihash minus its two-byte SHA-256 prefix.

use crate::error::{DidError, Result};
use crate::storage::content_store::ContentStore;
use crate::utils::serialization::{deserialize, serialize};
use ethers::utils::hex;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn ContentStore>,
}

impl Store {
    pub fn new(backend: Arc<dyn ContentStore>) -> Self {
        Self { backend }
    }

    /// Serializes `value` and stores it, returning its hash.
    pub async fn put_json<T: Serialize + Sync>(&self, value: &T) -> Result<String> {
        let json = serialize(value)?;
        self.backend.put(json.as_bytes()).await
    }

    /// Fetches and deserializes the value stored under `hash`.
    ///
    /// # Errors
    /// [`DidError::Storage`] if the content is not UTF-8 JSON of type `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, hash: &str) -> Result<T> {
        let bytes = self.backend.get(hash).await?;
        let json = String::from_utf8(bytes)
            .map_err(|e| DidError::Storage(format!("content at {} is not UTF-8: {}", hash, e)))?;
        deserialize(&json).map_err(|e| DidError::Storage(format!("content at {} is not the expected JSON: {}", hash, e)))
    }
}

/// `0x`-prefixed 32-byte form of a `Qm...` hash.
///
/// # Errors
/// [`DidError::Storage`] if `hash` is not a base58 SHA-256 multihash.
pub fn hash_to_bytes32(hash: &str) -> Result<String> {
    let raw = bs58::decode(hash)
        .into_vec()
        .map_err(|e| DidError::Storage(format!("{} is not base58: {}", hash, e)))?;
    match raw.as_slice() {
        [0x12, 0x20, digest @ ..] if digest.len() == 32 => Ok(format!("0x{}", hex::encode(digest))),
        _ => Err(DidError::Storage(format!("{} is not a SHA-256 multihash", hash))),
    }
}

/// Inverse of [`hash_to_bytes32`].
pub fn bytes32_to_hash(bytes32: &str) -> Result<String> {
    let digest = hex::decode(bytes32.trim_start_matches("0x"))
        .map_err(|e| DidError::Storage(format!("{} is not hex: {}", bytes32, e)))?;
    if digest.len() != 32 {
        return Err(DidError::Storage(format!("expected 32 bytes, got {}", digest.len())));
    }
    let mut multihash = vec![0x12, 0x20];
    multihash.extend(digest);
    Ok(bs58::encode(multihash).into_string())
}
