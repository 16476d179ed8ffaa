// src/blockchain/ethr_client.rs
//! DID registry client over Ethereum JSON-RPC.
//!
//! Provides read-only access to an `EthereumDIDRegistry` deployment:
//! - `changed(address)` for the identity's last-changed block
//! - `identityOwner(address)` for the current owner
//! - `DIDOwnerChanged` / `DIDDelegateChanged` / `DIDAttributeChanged` logs
//!   recorded at a single block
//!
//! Every call is bounded by the configured ledger timeout. Timeouts and RPC
//! failures surface as `LedgerUnavailable`; nothing is retried here.

use crate::blockchain::ledger::{ChangeEvent, LedgerClient, Pointer};
use crate::config::ResolverConfig;
use crate::error::{DidError, Result};
use async_trait::async_trait;
use ethers::abi::{parse_abi, Detokenize, Tokenize};
use ethers::contract::{parse_log, BaseContract, Contract, EthEvent};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Bytes, Filter, Log, H256, U256};
use log::debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "DIDOwnerChanged", abi = "DIDOwnerChanged(address,address,uint256)")]
struct DidOwnerChanged {
    #[ethevent(indexed)]
    identity: Address,
    owner: Address,
    previous_change: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(
    name = "DIDDelegateChanged",
    abi = "DIDDelegateChanged(address,bytes32,address,uint256,uint256)"
)]
struct DidDelegateChanged {
    #[ethevent(indexed)]
    identity: Address,
    delegate_type: [u8; 32],
    delegate: Address,
    valid_to: U256,
    previous_change: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(
    name = "DIDAttributeChanged",
    abi = "DIDAttributeChanged(address,bytes32,bytes,uint256,uint256)"
)]
struct DidAttributeChanged {
    #[ethevent(indexed)]
    identity: Address,
    name: [u8; 32],
    value: Bytes,
    valid_to: U256,
    previous_change: U256,
}

const REGISTRY_ABI: &[&str] = &[
    "function changed(address identity) external view returns (uint256)",
    "function identityOwner(address identity) external view returns (address)",
];

/// JSON-RPC client for the DID registry contract.
#[derive(Clone)]
pub struct EthrRegistryClient {
    /// Ledger RPC provider
    provider: Arc<Provider<Http>>,
    /// Registry contract instance
    registry: Contract<Provider<Http>>,
    registry_address: Address,
    timeout: Duration,
}

fn unavailable(err: impl std::fmt::Display) -> DidError {
    DidError::LedgerUnavailable(err.to_string())
}

fn parse_address(identity: &str) -> Result<Address> {
    identity
        .parse()
        .map_err(|_| DidError::MalformedDid(format!("not an address: {}", identity)))
}

fn to_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

fn undecodable(event: &str, err: impl std::fmt::Display) -> DidError {
    DidError::LedgerUnavailable(format!("undecodable {} log: {}", event, err))
}

fn format_address(addr: Address) -> String {
    format!("0x{:x}", addr)
}

impl EthrRegistryClient {
    /// Creates a client for the registry named in `config`.
    ///
    /// # Errors
    /// - [`DidError::Config`] if the RPC URL or registry address is invalid
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| DidError::Config(format!("invalid rpc url: {}", e)))?;
        let registry_address: Address = config
            .registry_address
            .parse()
            .map_err(|e| DidError::Config(format!("invalid registry address: {}", e)))?;
        let abi = parse_abi(REGISTRY_ABI).map_err(|e| DidError::Config(e.to_string()))?;
        let provider = Arc::new(provider);
        let registry = Contract::new(registry_address, BaseContract::from(abi), provider.clone());

        Ok(Self {
            provider,
            registry,
            registry_address,
            timeout: Duration::from_secs(config.ledger_timeout_secs),
        })
    }

    async fn with_deadline<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| unavailable(format!("ledger call exceeded {:?}", self.timeout)))?
    }

    /// Queries a registry view function.
    async fn query_contract<R: Detokenize>(&self, method: &str, params: impl Tokenize) -> Result<R> {
        let call = self.registry.method::<_, R>(method, params).map_err(unavailable)?;
        self.with_deadline(async { call.call().await.map_err(unavailable) })
            .await
    }

    /// Decodes one registry log. Logs of other events yield `None`; a DID
    /// event whose data does not decode is an error.
    fn decode(log: Log) -> Result<Option<ChangeEvent>> {
        let topic = match log.topics.first() {
            Some(topic) => *topic,
            None => return Ok(None),
        };
        let event = if topic == DidDelegateChanged::signature() {
            let event: DidDelegateChanged = parse_log(log).map_err(|e| undecodable("DIDDelegateChanged", e))?;
            ChangeEvent::DelegateChanged {
                delegate_type: event.delegate_type,
                delegate: format_address(event.delegate),
                valid_to: to_u64(event.valid_to),
                previous_change: to_u64(event.previous_change),
            }
        } else if topic == DidAttributeChanged::signature() {
            let event: DidAttributeChanged = parse_log(log).map_err(|e| undecodable("DIDAttributeChanged", e))?;
            ChangeEvent::AttributeChanged {
                name: event.name,
                value: event.value.to_vec(),
                valid_to: to_u64(event.valid_to),
                previous_change: to_u64(event.previous_change),
            }
        } else if topic == DidOwnerChanged::signature() {
            let event: DidOwnerChanged = parse_log(log).map_err(|e| undecodable("DIDOwnerChanged", e))?;
            ChangeEvent::OwnerChanged {
                owner: format_address(event.owner),
                previous_change: to_u64(event.previous_change),
            }
        } else {
            return Ok(None);
        };
        Ok(Some(event))
    }
}

#[async_trait]
impl LedgerClient for EthrRegistryClient {
    async fn get_last_changed(&self, identity: &str) -> Result<Option<Pointer>> {
        let changed: U256 = self.query_contract("changed", parse_address(identity)?).await?;
        Ok(if changed.is_zero() { None } else { Some(to_u64(changed)) })
    }

    async fn get_change_events_at(&self, identity: &str, pointer: Pointer) -> Result<Vec<ChangeEvent>> {
        let topic = H256::from(parse_address(identity)?);
        let filter = Filter::new()
            .address(self.registry_address)
            .topic1(topic)
            .from_block(pointer)
            .to_block(pointer);

        let logs = self
            .with_deadline(async { self.provider.get_logs(&filter).await.map_err(unavailable) })
            .await?;
        debug!("fetched {} registry logs for {} at block {}", logs.len(), identity, pointer);

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            if let Some(event) = Self::decode(log)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn get_owner(&self, identity: &str) -> Result<String> {
        let owner: Address = self
            .query_contract("identityOwner", parse_address(identity)?)
            .await?;
        Ok(format_address(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_registry_address() {
        let config = ResolverConfig {
            registry_address: "not-an-address".into(),
            ..ResolverConfig::default()
        };
        assert!(matches!(EthrRegistryClient::new(&config), Err(DidError::Config(_))));
    }

    #[test]
    fn test_event_signatures_are_distinct() {
        assert_ne!(DidDelegateChanged::signature(), DidAttributeChanged::signature());
        assert_ne!(DidOwnerChanged::signature(), DidAttributeChanged::signature());
    }

    fn registry_log(topic: H256, data: Vec<u8>) -> Log {
        Log {
            topics: vec![topic, H256::from(Address::repeat_byte(0x11))],
            data: Bytes::from(data),
            ..Log::default()
        }
    }

    #[test]
    fn test_truncated_delegate_log_is_an_error() {
        let log = registry_log(DidDelegateChanged::signature(), vec![0u8; 10]);
        let err = EthrRegistryClient::decode(log).unwrap_err();
        assert!(matches!(err, DidError::LedgerUnavailable(_)));
    }

    #[test]
    fn test_decodes_delegate_log() {
        let mut data = Vec::new();
        let mut delegate_type = [0u8; 32];
        delegate_type[..7].copy_from_slice(b"veriKey");
        data.extend_from_slice(&delegate_type);
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&[0x22; 20]);
        data.extend_from_slice(&word);
        let mut valid_to = [0u8; 32];
        valid_to[31] = 100;
        data.extend_from_slice(&valid_to);
        let mut previous = [0u8; 32];
        previous[31] = 7;
        data.extend_from_slice(&previous);

        let event = EthrRegistryClient::decode(registry_log(DidDelegateChanged::signature(), data))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            ChangeEvent::DelegateChanged {
                delegate_type,
                delegate: "0x2222222222222222222222222222222222222222".into(),
                valid_to: 100,
                previous_change: 7,
            }
        );
    }

    #[test]
    fn test_unrelated_log_is_skipped() {
        let log = registry_log(H256::repeat_byte(0xab), vec![]);
        assert!(EthrRegistryClient::decode(log).unwrap().is_none());
    }

    #[test]
    fn test_large_values_saturate() {
        assert_eq!(to_u64(U256::MAX), u64::MAX);
        assert_eq!(to_u64(U256::from(42u64)), 42);
    }
}
