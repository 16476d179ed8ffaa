// src/blockchain/memory_ledger.rs
//! In-process DID registry for offline use and tests.
//!
//! Mirrors the on-chain registry's bookkeeping: every write lands in the
//! current block, records the identity's previous change pointer, and moves
//! the identity's "last changed" pointer to that block.

use crate::blockchain::ledger::{ChangeEvent, LedgerClient, Pointer};
use crate::did::address::encode_attribute_name;
use crate::error::{DidError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct LedgerState {
    block: Pointer,
    owners: HashMap<String, String>,
    changed: HashMap<String, Pointer>,
    events: HashMap<(String, Pointer), Vec<ChangeEvent>>,
}

/// Deterministic in-memory [`LedgerClient`].
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    offline: AtomicBool,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates an empty ledger whose first block is 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                block: 1,
                ..LedgerState::default()
            }),
            offline: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent read fail with `LedgerUnavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Advances to a new block; later writes land there.
    pub fn mine(&self) -> Pointer {
        let mut state = self.lock();
        state.block += 1;
        state.block
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, identity: &str, make: impl FnOnce(Pointer) -> ChangeEvent) -> Pointer {
        let identity = identity.to_lowercase();
        let mut state = self.lock();
        let block = state.block;
        let previous = state.changed.get(&identity).copied().unwrap_or(0);
        state
            .events
            .entry((identity.clone(), block))
            .or_default()
            .push(make(previous));
        state.changed.insert(identity, block);
        block
    }

    /// Transfers ownership of `identity` to `new_owner`.
    pub fn change_owner(&self, identity: &str, new_owner: &str) -> Pointer {
        self.lock()
            .owners
            .insert(identity.to_lowercase(), new_owner.to_lowercase());
        self.record(identity, |previous_change| ChangeEvent::OwnerChanged {
            owner: new_owner.to_lowercase(),
            previous_change,
        })
    }

    /// Adds (or, with a past `valid_to`, revokes) a delegate.
    pub fn add_delegate(&self, identity: &str, delegate_type: &str, delegate: &str, valid_to: u64) -> Pointer {
        self.record(identity, |previous_change| ChangeEvent::DelegateChanged {
            delegate_type: encode_attribute_name(delegate_type),
            delegate: delegate.to_lowercase(),
            valid_to,
            previous_change,
        })
    }

    /// Sets (or, with a past `valid_to`, revokes) an attribute.
    pub fn set_attribute(&self, identity: &str, name: &str, value: &[u8], valid_to: u64) -> Pointer {
        self.record(identity, |previous_change| ChangeEvent::AttributeChanged {
            name: encode_attribute_name(name),
            value: value.to_vec(),
            valid_to,
            previous_change,
        })
    }

    /// Appends a raw event at the current block without touching the
    /// identity's pointer bookkeeping.
    pub fn push_raw(&self, identity: &str, event: ChangeEvent) {
        let mut state = self.lock();
        let block = state.block;
        state
            .events
            .entry((identity.to_lowercase(), block))
            .or_default()
            .push(event);
        state.changed.insert(identity.to_lowercase(), block);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DidError::LedgerUnavailable("in-memory ledger is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_last_changed(&self, identity: &str) -> Result<Option<Pointer>> {
        self.ensure_online()?;
        Ok(self.lock().changed.get(&identity.to_lowercase()).copied())
    }

    async fn get_change_events_at(&self, identity: &str, pointer: Pointer) -> Result<Vec<ChangeEvent>> {
        self.ensure_online()?;
        Ok(self
            .lock()
            .events
            .get(&(identity.to_lowercase(), pointer))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_owner(&self, identity: &str) -> Result<String> {
        self.ensure_online()?;
        let identity = identity.to_lowercase();
        Ok(self.lock().owners.get(&identity).cloned().unwrap_or(identity))
    }
}
