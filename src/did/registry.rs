// src/did/registry.rs
//! Method-name → resolver table.
//!
//! The registry is an explicit object handed to every resolution call rather
//! than a process global. It is read on every resolution and written rarely,
//! so the table sits behind a reader-writer lock; resolvers are cloned out
//! of the lock before any await point.

use crate::did::address;
use crate::error::{DidError, Result};
use crate::models::did::{DIDDocument, ParsedDid};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Resolves DIDs of one method to their documents.
#[async_trait]
pub trait MethodResolver: Send + Sync {
    /// Resolves `did` (already parsed as `parsed`) as of Unix time `now`.
    async fn resolve(&self, did: &str, parsed: &ParsedDid, now: u64) -> Result<DIDDocument>;
}

/// Thread-safe table of DID method resolvers.
#[derive(Default)]
pub struct ResolverRegistry {
    methods: RwLock<HashMap<String, Arc<dyn MethodResolver>>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resolver` for `method`, replacing any previous resolver for
    /// that method. Last write wins.
    pub fn register_method(&self, method: &str, resolver: Arc<dyn MethodResolver>) {
        let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
        if methods.insert(method.to_string(), resolver).is_some() {
            debug!("replaced resolver for DID method '{}'", method);
        } else {
            debug!("registered resolver for DID method '{}'", method);
        }
    }

    /// Removes the resolver for `method`, returning whether one was present.
    pub fn unregister_method(&self, method: &str) -> bool {
        let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
        methods.remove(method).is_some()
    }

    pub fn has_method(&self, method: &str) -> bool {
        let methods = self.methods.read().unwrap_or_else(PoisonError::into_inner);
        methods.contains_key(method)
    }

    fn lookup(&self, method: &str) -> Option<Arc<dyn MethodResolver>> {
        let methods = self.methods.read().unwrap_or_else(PoisonError::into_inner);
        methods.get(method).cloned()
    }

    /// Resolves `did` as of the current time.
    pub async fn resolve(&self, did: &str) -> Result<DIDDocument> {
        self.resolve_at(did, now_secs()).await
    }

    /// Resolves `did` as of Unix time `now`.
    ///
    /// # Errors
    /// - [`DidError::MalformedDid`] if `did` does not parse
    /// - [`DidError::UnsupportedMethod`] if no resolver is registered
    /// - whatever the method resolver reports
    pub async fn resolve_at(&self, did: &str, now: u64) -> Result<DIDDocument> {
        let parsed = address::parse(did)?;
        let resolver = self
            .lookup(&parsed.method)
            .ok_or_else(|| DidError::UnsupportedMethod(parsed.method.clone()))?;
        debug!("resolving {} at {}", did, now);
        resolver.resolve(did, &parsed, now).await
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
