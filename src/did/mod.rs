// src/did/mod.rs
//! DID parsing, method dispatch and ledger-backed document reconstruction.

pub mod address;
pub mod event_replay;
pub mod registry;
