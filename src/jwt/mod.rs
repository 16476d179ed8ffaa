// src/jwt/mod.rs
//! JWT-style credential codec with recoverable secp256k1 signatures.

pub mod algorithms;
pub mod codec;

pub use codec::{create_jwt, decode_jwt, CreateOptions, CredentialCodec, VerifyOptions, IAT_SKEW};
