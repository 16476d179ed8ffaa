// src/wallet/mod.rs
//! Identity key material and signing.

pub mod key_management;
