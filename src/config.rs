// src/config.rs
//! Runtime configuration for ledger-backed resolution.
//!
//! Values are layered in this order (later wins):
//! 1. Built-in defaults
//! 2. Optional `did-credentials.toml` in the working directory
//! 3. Environment variables prefixed with `DID_` (a `.env` file is loaded first)
//!
//! ## Environment Variables
//! - `DID_RPC_URL`: JSON-RPC endpoint of the ledger node
//! - `DID_REGISTRY_ADDRESS`: deployed DID registry contract address
//! - `DID_METHOD`: method name the ledger resolver registers under
//! - `DID_MAX_HISTORY_STEPS`: bound on the backward change-log walk
//! - `DID_LEDGER_TIMEOUT_SECS`: deadline applied to every ledger call
//! - `DID_IAT_SKEW_SECS`: clock skew tolerated when checking `iat`/`exp`

use crate::error::Result;
use dotenv::dotenv;
use serde::Deserialize;

/// Name of the optional configuration file, without extension.
pub const CONFIG_FILE: &str = "did-credentials";

/// Settings for the ledger resolver and credential verification.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ResolverConfig {
    pub rpc_url: String,
    pub registry_address: String,
    pub method: String,
    pub max_history_steps: usize,
    pub ledger_timeout_secs: u64,
    pub iat_skew_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            registry_address: "0xdca7ef03e98e0dc2b855be647c39abe984fcf21b".to_string(),
            method: "ethr".to_string(),
            max_history_steps: 1000,
            ledger_timeout_secs: 30,
            iat_skew_secs: 300,
        }
    }
}

impl ResolverConfig {
    /// Loads configuration from defaults, the optional config file and the
    /// process environment.
    ///
    /// # Errors
    /// Returns [`DidError::Config`](crate::error::DidError::Config) if a source
    /// holds a value of the wrong type.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::load_from(config::Environment::with_prefix("DID"))
    }

    fn load_from(env: config::Environment) -> Result<Self> {
        let defaults = Self::default();
        let settings = config::Config::builder()
            .set_default("rpc_url", defaults.rpc_url)?
            .set_default("registry_address", defaults.registry_address)?
            .set_default("method", defaults.method)?
            .set_default("max_history_steps", defaults.max_history_steps as i64)?
            .set_default("ledger_timeout_secs", defaults.ledger_timeout_secs as i64)?
            .set_default("iat_skew_secs", defaults.iat_skew_secs as i64)?
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(env)
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Initializes `env_logger`, honouring `RUST_LOG` and defaulting to `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
