// src/models/mod.rs
//! Data structures shared by resolution and credential exchange.

pub mod credential;
pub mod did;
