// src/storage/ipfs_client.rs
//! IPFS-backed [`ContentStore`].
//!
//! # Security Considerations
//! - All stored data is public by default (IPFS is a public network)
//! - Hashes are content-addressable and permanent

use crate::error::{DidError, Result};
use crate::storage::content_store::ContentStore;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;
use ipfs_api_backend_hyper::{IpfsApi, IpfsClient, TryFromUri};
use log::debug;
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task;

/// Thread-safe IPFS client wrapper.
///
/// Every request runs on a blocking worker with its own runtime, so callers
/// on any executor can await it.
#[derive(Clone)]
pub struct IpfsStorage {
    /// Shared IPFS client instance (thread-safe via Arc)
    client: Arc<IpfsClient>,
}

impl Default for IpfsStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl IpfsStorage {
    /// Creates a client for the local node at `http://localhost:5001`.
    ///
    /// Connection errors surface on the first operation, as
    /// [`DidError::Storage`].
    pub fn new() -> Self {
        IpfsStorage {
            client: Arc::new(IpfsClient::default()),
        }
    }

    /// Creates a client for the node API at `url`.
    ///
    /// # Errors
    /// [`DidError::Config`] if `url` is not a valid URI.
    pub fn with_url(url: &str) -> Result<Self> {
        let client = IpfsClient::from_str(url)
            .map_err(|e| DidError::Config(format!("invalid IPFS API url {}: {}", url, e)))?;
        Ok(IpfsStorage {
            client: Arc::new(client),
        })
    }

    async fn run_blocking<T, F, Fut>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<IpfsClient>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.client.clone();
        task::spawn_blocking(move || -> Result<T> {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| DidError::Storage(format!("cannot start IPFS runtime: {}", e)))?;
            rt.block_on(op(client))
        })
        .await
        .map_err(|e| DidError::Storage(format!("IPFS task failed: {}", e)))?
    }
}

#[async_trait]
impl ContentStore for IpfsStorage {
    async fn put(&self, data: &[u8]) -> Result<String> {
        let data_owned = data.to_vec();
        let hash = self
            .run_blocking(|client| async move {
                let res = client
                    .add(Cursor::new(data_owned))
                    .await
                    .map_err(|e| DidError::Storage(format!("IPFS add failed: {}", e)))?;
                Ok(res.hash)
            })
            .await?;
        debug!("stored {} bytes at {}", data.len(), hash);
        Ok(hash)
    }

    async fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let hash = hash.to_string();
        self.run_blocking(|client| async move {
            let data = client
                .cat(&hash)
                .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                    acc.extend_from_slice(&chunk);
                    Ok(acc)
                })
                .await
                .map_err(|e| DidError::Storage(format!("IPFS cat {} failed: {}", hash, e)))?;
            Ok(data.to_vec())
        })
        .await
    }
}
