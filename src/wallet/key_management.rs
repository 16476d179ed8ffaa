// src/wallet/key_management.rs
//! Cryptographic key management for DID identities.
//!
//! Provides secp256k1 identities and the signing primitive credentials are
//! built on:
//! - Key generation from the system RNG, or import from a hex private key
//! - Deterministic (RFC 6979) ECDSA over the SHA-256 digest of the message
//! - Recovery parameter alongside `r`/`s` so verifiers can derive the key
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - SHA-256 (via `ring`) and Keccak-256 (via `ethers`)

use crate::error::{DidError, Result};
use crate::utils::crypto::{sha256, to_ethereum_address};
use ethers::utils::hex;
use k256::ecdsa::SigningKey;
use std::fmt;

/// An ECDSA signature split into hex components.
///
/// `r` and `s` are 64 lowercase hex characters each, zero-left-padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaSignature {
    pub r: String,
    pub s: String,
    pub recovery_param: u8,
}

impl EcdsaSignature {
    /// `r || s` as 64 raw bytes.
    pub fn to_rs_bytes(&self) -> Result<Vec<u8>> {
        let mut out = hex::decode(&self.r).map_err(|e| DidError::SignatureInvalid(e.to_string()))?;
        out.extend(hex::decode(&self.s).map_err(|e| DidError::SignatureInvalid(e.to_string()))?);
        if out.len() != 64 {
            return Err(DidError::SignatureInvalid(format!(
                "expected 64 signature bytes, got {}",
                out.len()
            )));
        }
        Ok(out)
    }
}

/// Something that can sign credential data on an identity's behalf.
///
/// Implementations sign the SHA-256 digest of `data` and report the
/// recovery parameter of the signature.
pub trait Signer: Send + Sync {
    fn sign(&self, data: &[u8]) -> Result<EcdsaSignature>;
}

fn leftpad(value: &str) -> String {
    format!("{:0>64}", value)
}

/// A secp256k1 identity.
///
/// # Security Notes
/// - The secret key is never exposed through `Debug`
/// - Signatures are deterministic (RFC 6979) and low-S normalized
#[derive(Clone)]
pub struct KeyManager {
    /// Securely stored private key (never exposed)
    signing_key: SigningKey,
    /// `0x`-prefixed Ethereum address of the public key
    address: String,
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl KeyManager {
    /// Generates a KeyManager with a fresh random key.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Imports a hex-encoded private key (with or without `0x`).
    ///
    /// # Errors
    /// [`DidError::InvalidRequestParams`] if the key is not hex or not a
    /// valid secp256k1 scalar.
    pub fn from_private_key(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim_start_matches("0x"))
            .map_err(|e| DidError::InvalidRequestParams(format!("private key is not hex: {}", e)))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|_| DidError::InvalidRequestParams("invalid secp256k1 private key".to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = to_ethereum_address(signing_key.verifying_key());
        Self { signing_key, address }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The identity's DID under `method`: `did:<method>:<address>`.
    pub fn did(&self, method: &str) -> String {
        format!("did:{}:{}", method, self.address)
    }

    /// Uncompressed public key as hex (`04...`).
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_encoded_point(false).as_bytes())
    }

    /// Private key as hex, for export to the identity's holder.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl Signer for KeyManager {
    fn sign(&self, data: &[u8]) -> Result<EcdsaSignature> {
        let digest = sha256(data);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| DidError::SignatureInvalid(format!("signing failed: {}", e)))?;
        let (r, s) = signature.split_bytes();
        Ok(EcdsaSignature {
            r: leftpad(&hex::encode(r)),
            s: leftpad(&hex::encode(s)),
            recovery_param: recovery_id.to_byte(),
        })
    }
}
