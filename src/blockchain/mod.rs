// src/blockchain/mod.rs
//! Ledger access: the [`ledger::LedgerClient`] contract plus a JSON-RPC
//! implementation and an in-memory one.

pub mod ethr_client;
pub mod ledger;
pub mod memory_ledger;
