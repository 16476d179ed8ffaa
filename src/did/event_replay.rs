// src/did/event_replay.rs
//! DID Document reconstruction from the registry's change log.
//!
//! Resolution happens in two phases:
//! 1. **Walk**: starting at the identity's last-changed pointer, fetch the
//!    events recorded at each pointer and follow the smallest earlier
//!    `previous_change` until the chain ends. The walk is bounded by
//!    `max_history_steps`.
//! 2. **Fold**: replay the history oldest to newest as of time `now`,
//!    keeping live delegates and attributes and numbering delegate keys
//!    sequentially.
//!
//! The fold ([`wrap_did_document`]) is a pure function of
//! `(did, owner, history, now)`.

use crate::blockchain::ledger::{ChangeEvent, LedgerClient, Pointer};
use crate::did::address::{self, AttributeSection};
use crate::did::registry::MethodResolver;
use crate::error::{DidError, Result};
use crate::models::did::{
    AuthenticationEntry, DIDDocument, KeyMaterial, ParsedDid, PublicKeyEntry, ServiceEndpoint,
    DID_CONTEXT, SECP256K1_SIGNATURE_AUTHENTICATION, SECP256K1_VERIFICATION_KEY,
};
use async_trait::async_trait;
use ethers::utils::hex;
use log::{debug, warn};
use std::sync::Arc;

/// Delegate type of a delegate that may sign on the identity's behalf.
pub const DELEGATE_SIG_AUTH: &str = "sigAuth";
/// Delegate type of a verification-only delegate.
pub const DELEGATE_VERI_KEY: &str = "veriKey";

fn attribute_type_alias(key_type: &str) -> &str {
    match key_type {
        DELEGATE_SIG_AUTH => "SignatureAuthentication2018",
        DELEGATE_VERI_KEY => "VerificationKey2018",
        other => other,
    }
}

/// Identity of a live slot: which event kind, which delegate type or
/// attribute name, and which delegate or value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotKey {
    Delegate { delegate_type: [u8; 32], delegate: String },
    Attribute { name: [u8; 32], value: Vec<u8> },
}

/// What a live slot contributes to the document.
#[derive(Debug)]
struct Slot {
    key: SlotKey,
    /// Delegate number, for slots that consumed one
    number: Option<u32>,
    public_key: Option<PublicKeyEntry>,
    authentication: Option<AuthenticationEntry>,
    service: Option<ServiceEndpoint>,
}

impl Slot {
    fn empty(key: SlotKey, number: Option<u32>) -> Self {
        Self {
            key,
            number,
            public_key: None,
            authentication: None,
            service: None,
        }
    }
}

fn delegate_slot(did: &str, key: SlotKey, number: u32, delegate_type: &str, delegate: &str) -> Slot {
    let id = format!("{}#delegate-{}", did, number);
    let mut slot = Slot::empty(key, Some(number));
    match delegate_type {
        DELEGATE_SIG_AUTH | DELEGATE_VERI_KEY => {
            slot.public_key = Some(PublicKeyEntry {
                id: id.clone(),
                key_type: SECP256K1_VERIFICATION_KEY.to_string(),
                owner: did.to_string(),
                material: KeyMaterial::EthereumAddress(delegate.to_string()),
            });
        }
        other => debug!("delegate type '{}' consumes an id but lists no key", other),
    }
    if delegate_type == DELEGATE_SIG_AUTH {
        slot.authentication = Some(AuthenticationEntry {
            auth_type: SECP256K1_SIGNATURE_AUTHENTICATION.to_string(),
            public_key: id,
        });
    }
    slot
}

fn key_material(encoding: Option<&str>, value: &[u8]) -> KeyMaterial {
    match encoding {
        None | Some("hex") => KeyMaterial::Hex(hex::encode(value)),
        Some("base64") => KeyMaterial::Base64(base64::encode(value)),
        Some("base58") => KeyMaterial::Base58(bs58::encode(value).into_string()),
        Some("pem") => KeyMaterial::Pem(String::from_utf8_lossy(value).into_owned()),
        Some(_) => KeyMaterial::Raw(format!("0x{}", hex::encode(value))),
    }
}

/// Active slots in insertion order, with the running delegate counter.
struct Replay<'a> {
    did: &'a str,
    now: u64,
    counter: u32,
    slots: Vec<Slot>,
}

impl<'a> Replay<'a> {
    fn insert(&mut self, slot: Slot) {
        // A re-added slot takes its new number and moves to the end.
        self.slots.retain(|existing| existing.key != slot.key);
        self.slots.push(slot);
    }

    /// Drops the slot for `key`. The counter is handed back only when the
    /// dropped slot holds the most recently assigned number.
    fn expire(&mut self, key: &SlotKey) {
        if let Some(pos) = self.slots.iter().position(|slot| &slot.key == key) {
            let removed = self.slots.remove(pos);
            if removed.number.is_some() && removed.number == Some(self.counter) {
                self.counter -= 1;
            }
        }
    }

    fn next_number(&mut self) -> u32 {
        self.counter += 1;
        self.counter
    }

    fn apply(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::DelegateChanged {
                delegate_type,
                delegate,
                valid_to,
                ..
            } => {
                let key = SlotKey::Delegate {
                    delegate_type: *delegate_type,
                    delegate: delegate.to_lowercase(),
                };
                if *valid_to >= self.now {
                    let number = self.next_number();
                    let kind = address::decode_attribute_name(delegate_type);
                    let slot = delegate_slot(self.did, key, number, &kind, delegate);
                    self.insert(slot);
                } else {
                    self.expire(&key);
                }
            }
            ChangeEvent::AttributeChanged {
                name,
                value,
                valid_to,
                ..
            } => {
                let key = SlotKey::Attribute {
                    name: *name,
                    value: value.clone(),
                };
                if *valid_to < self.now {
                    self.expire(&key);
                    return;
                }
                let decoded = address::decode_attribute_name(name);
                let path = match address::decode_attribute_path(&decoded) {
                    Some(path) => path,
                    None => return,
                };
                match path.section {
                    AttributeSection::PublicKey => {
                        let number = self.next_number();
                        let key_type = match &path.key_type {
                            Some(t) => format!("{}{}", path.algorithm, attribute_type_alias(t)),
                            None => path.algorithm.clone(),
                        };
                        let mut slot = Slot::empty(key, Some(number));
                        slot.public_key = Some(PublicKeyEntry {
                            id: format!("{}#delegate-{}", self.did, number),
                            key_type,
                            owner: self.did.to_string(),
                            material: key_material(path.encoding.as_deref(), value),
                        });
                        self.insert(slot);
                    }
                    AttributeSection::Service => {
                        let mut slot = Slot::empty(key, None);
                        slot.service = Some(ServiceEndpoint {
                            service_type: path.algorithm.clone(),
                            service_endpoint: String::from_utf8_lossy(value).into_owned(),
                        });
                        self.insert(slot);
                    }
                    AttributeSection::Authentication => {
                        debug!("ignoring authentication attribute '{}'", decoded);
                    }
                }
            }
            ChangeEvent::OwnerChanged { .. } => {}
        }
    }
}

/// Folds an identity's change history into its DID Document as of `now`.
///
/// `did` is the document id, `owner` the identity's current owner address.
/// Events whose `valid_to` is earlier than `now` remove the matching live
/// entry. The owner key (`<did>#owner`) and its authentication entry always
/// come first; live delegates follow in the order they were added.
pub fn wrap_did_document(did: &str, owner: &str, history: &[ChangeEvent], now: u64) -> DIDDocument {
    let owner_key_id = format!("{}#owner", did);
    let mut public_key = vec![PublicKeyEntry {
        id: owner_key_id.clone(),
        key_type: SECP256K1_VERIFICATION_KEY.to_string(),
        owner: did.to_string(),
        material: KeyMaterial::EthereumAddress(owner.to_lowercase()),
    }];
    let mut authentication = vec![AuthenticationEntry {
        auth_type: SECP256K1_SIGNATURE_AUTHENTICATION.to_string(),
        public_key: owner_key_id,
    }];
    let mut service = Vec::new();

    let mut replay = Replay {
        did,
        now,
        counter: 0,
        slots: Vec::new(),
    };
    for event in history {
        replay.apply(event);
    }

    for slot in replay.slots {
        public_key.extend(slot.public_key);
        authentication.extend(slot.authentication);
        service.extend(slot.service);
    }

    DIDDocument {
        context: DID_CONTEXT.to_string(),
        id: did.to_string(),
        public_key,
        authentication,
        service,
        profile: None,
    }
}

/// [`MethodResolver`] that rebuilds documents from a [`LedgerClient`].
pub struct EventReplayResolver<L: LedgerClient> {
    ledger: Arc<L>,
    max_history_steps: usize,
}

impl<L: LedgerClient> EventReplayResolver<L> {
    pub fn new(ledger: Arc<L>, max_history_steps: usize) -> Self {
        Self {
            ledger,
            max_history_steps,
        }
    }

    /// Walks the identity's change pointers backwards and returns its
    /// history oldest first.
    ///
    /// Events recorded at one pointer keep their ledger order. Only
    /// `previous_change` values strictly below the current pointer are
    /// followed, so a self-referencing block cannot loop.
    ///
    /// # Errors
    /// - [`DidError::LedgerUnavailable`] on any failed ledger read
    /// - [`DidError::HistoryLimitExceeded`] if the chain is longer than
    ///   `max_history_steps`
    pub async fn change_log(&self, identity: &str) -> Result<Vec<ChangeEvent>> {
        let mut blocks: Vec<Vec<ChangeEvent>> = Vec::new();
        let mut pointer: Option<Pointer> = self.ledger.get_last_changed(identity).await?;

        while let Some(current) = pointer.filter(|p| *p > 0) {
            if blocks.len() >= self.max_history_steps {
                warn!("change log for {} exceeds {} steps", identity, self.max_history_steps);
                return Err(DidError::HistoryLimitExceeded {
                    identity: identity.to_string(),
                    limit: self.max_history_steps,
                });
            }
            let events = self.ledger.get_change_events_at(identity, current).await?;
            pointer = events
                .iter()
                .map(ChangeEvent::previous_change)
                .filter(|previous| *previous < current)
                .min();
            blocks.push(events);
        }

        debug!("change log for {} spans {} pointers", identity, blocks.len());
        Ok(blocks.into_iter().rev().flatten().collect())
    }
}

#[async_trait]
impl<L: LedgerClient + 'static> MethodResolver for EventReplayResolver<L> {
    async fn resolve(&self, did: &str, parsed: &ParsedDid, now: u64) -> Result<DIDDocument> {
        if !address::is_address(&parsed.id) {
            return Err(DidError::MalformedDid(format!("not a valid DID: {}", did)));
        }
        let owner = self.ledger.get_owner(&parsed.id).await?;
        let history = self.change_log(&parsed.id).await?;
        Ok(wrap_did_document(&parsed.base(), &owner, &history, now))
    }
}
