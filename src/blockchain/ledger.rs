// src/blockchain/ledger.rs
//! Read-only view of the DID registry ledger.
//!
//! Each change to an identity is recorded as an event carrying a
//! `previous_change` pointer (the block of the identity's prior change),
//! forming a backward-linked chain anchored at the registry's "last changed"
//! pointer.

use crate::error::Result;
use async_trait::async_trait;

/// Ledger-native position of a change (a block number).
pub type Pointer = u64;

/// A change recorded against an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A delegate key was added (`valid_to` in the future) or revoked.
    DelegateChanged {
        delegate_type: [u8; 32],
        /// `0x`-prefixed delegate address
        delegate: String,
        valid_to: u64,
        previous_change: Pointer,
    },
    /// An attribute was set (`valid_to` in the future) or revoked.
    AttributeChanged {
        name: [u8; 32],
        value: Vec<u8>,
        valid_to: u64,
        previous_change: Pointer,
    },
    /// Ownership moved to `owner`. Walked, but adds nothing to documents.
    OwnerChanged {
        owner: String,
        previous_change: Pointer,
    },
}

impl ChangeEvent {
    pub fn previous_change(&self) -> Pointer {
        match self {
            ChangeEvent::DelegateChanged { previous_change, .. }
            | ChangeEvent::AttributeChanged { previous_change, .. }
            | ChangeEvent::OwnerChanged { previous_change, .. } => *previous_change,
        }
    }
}

/// Read access to the DID registry.
///
/// Addresses are `0x`-prefixed 40-hex-digit strings. Implementations bound
/// every call by a deadline and report failures as
/// [`DidError::LedgerUnavailable`](crate::error::DidError::LedgerUnavailable).
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// The pointer of the identity's most recent change, or `None` if it has
    /// never changed.
    async fn get_last_changed(&self, identity: &str) -> Result<Option<Pointer>>;

    /// All events recorded for `identity` at exactly `pointer`, in ledger order.
    async fn get_change_events_at(&self, identity: &str, pointer: Pointer) -> Result<Vec<ChangeEvent>>;

    /// The current owner address of `identity`.
    async fn get_owner(&self, identity: &str) -> Result<String>;
}
