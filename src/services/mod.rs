// src/services/mod.rs
//! Credential exchange protocol built on the codec and resolver.

pub mod contract;
pub mod credentials;
