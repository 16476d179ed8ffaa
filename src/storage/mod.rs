// src/storage/mod.rs
//! Content-addressed storage for signed tokens and disclosures.

pub mod content_store;
pub mod ipfs_client;
pub mod memory_store;
pub mod store;
