// src/lib.rs

//! # DID Credentials
//!
//! Resolution of ledger-anchored Decentralized Identifiers and exchange of
//! signed, JWT-style credentials between identities.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: `LedgerClient` over an ethr-style DID registry, or in memory
//! 2. **DID Layer**: DID parsing, method registry and change-log replay into documents
//! 3. **JWT Layer**: token codec with `ES256K` / `ES256K-R` signatures
//! 4. **Services Layer**: selective-disclosure protocol and transaction requests
//! 5. **Storage Layer**: content-addressed archive on IPFS or in memory
//!
//! ## Example
//! ```no_run
//! # async fn run() -> did_credentials::error::Result<()> {
//! use did_credentials::config::{init_logger, ResolverConfig};
//! use did_credentials::jwt::CredentialCodec;
//! use did_credentials::services::credentials::Credentials;
//! use did_credentials::wallet::key_management::KeyManager;
//!
//! init_logger();
//! let config = ResolverConfig::load()?;
//! let registry = did_credentials::ethr_registry(&config)?;
//! let codec = CredentialCodec::from_config(registry, &config);
//! let app = Credentials::from_key_manager(KeyManager::generate(), codec);
//! let disclosure = app.verify_disclosure("eyJ...").await?;
//! println!("{}", disclosure.did);
//! # Ok(())
//! # }
//! ```

use crate::blockchain::ethr_client::EthrRegistryClient;
use crate::config::ResolverConfig;
use crate::did::event_replay::EventReplayResolver;
use crate::did::registry::ResolverRegistry;
use crate::error::Result;
use std::sync::Arc;

// Module declarations (organized by functional domain)
pub mod blockchain; // Ledger access
pub mod config; // Layered settings and logger setup
pub mod did; // Parsing, method registry, document replay
pub mod error; // Error taxonomy
pub mod jwt; // Token codec and signature algorithms
pub mod models; // Data structures
pub mod services; // Disclosure protocol
pub mod storage; // Content-addressed storage
pub mod utils; // Helper functions
pub mod wallet; // Key generation and signing

/// Builds a registry that resolves `config.method` DIDs against the
/// configured ledger registry contract.
///
/// # Errors
/// [`DidError::Config`](crate::error::DidError::Config) if the RPC url or
/// registry address is invalid.
pub fn ethr_registry(config: &ResolverConfig) -> Result<Arc<ResolverRegistry>> {
    let ledger = Arc::new(EthrRegistryClient::new(config)?);
    let registry = Arc::new(ResolverRegistry::new());
    registry.register_method(
        &config.method,
        Arc::new(EventReplayResolver::new(ledger, config.max_history_steps)),
    );
    Ok(registry)
}
