// src/jwt/algorithms.rs
//! Signature algorithm registry for credential tokens.
//!
//! | `alg`      | signature segment        | verification                         |
//! |------------|--------------------------|--------------------------------------|
//! | `ES256K`   | `r \|\| s` (64 bytes)     | direct against key material, or by    |
//! |            |                          | recovery against address-only keys   |
//! | `ES256K-R` | `r \|\| s \|\| v` (65 bytes)| recover the key, match the document |
//!
//! Candidates are scanned in document order and the first match wins.

use crate::error::{DidError, Result};
use crate::models::did::{KeyMaterial, PublicKeyEntry};
use crate::utils::crypto::{parse_public_key, recover_public_key, sha256, to_ethereum_address, verify_prehash};
use crate::utils::serialization::{base64url_decode, base64url_encode};
use crate::wallet::key_management::Signer;
use ethers::utils::hex;
use k256::ecdsa::VerifyingKey;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Key types able to check secp256k1 signatures.
pub const SECP256K1_KEY_TYPES: &[&str] = &[
    "Secp256k1VerificationKey2018",
    "Secp256k1SignatureVerificationKey2018",
    "EcdsaPublicKeySecp256k1",
];

/// Algorithm used when none is requested.
pub const DEFAULT_ALG: &str = "ES256K";

/// A registered signature algorithm.
#[derive(Debug)]
pub struct Algorithm {
    pub name: &'static str,
    /// Whether the signature carries a recovery parameter
    pub recoverable: bool,
    /// Document key types whose keys may verify this algorithm
    pub key_types: &'static [&'static str],
}

static ALGORITHMS: Lazy<HashMap<&'static str, Algorithm>> = Lazy::new(|| {
    [
        Algorithm {
            name: "ES256K",
            recoverable: false,
            key_types: SECP256K1_KEY_TYPES,
        },
        Algorithm {
            name: "ES256K-R",
            recoverable: true,
            key_types: SECP256K1_KEY_TYPES,
        },
    ]
    .into_iter()
    .map(|alg| (alg.name, alg))
    .collect()
});

/// Looks up a registered algorithm.
///
/// # Errors
/// [`DidError::UnsupportedAlgorithm`] for unknown names.
pub fn lookup(name: &str) -> Result<&'static Algorithm> {
    ALGORITHMS
        .get(name)
        .ok_or_else(|| DidError::UnsupportedAlgorithm(format!("no supported signature types for algorithm {}", name)))
}

fn decode_key_bytes(material: &KeyMaterial) -> Option<Vec<u8>> {
    match material {
        KeyMaterial::Hex(h) => hex::decode(h.trim_start_matches("0x")).ok(),
        KeyMaterial::Raw(h) => hex::decode(h.trim_start_matches("0x")).ok(),
        KeyMaterial::Base64(b) => base64::decode(b).ok(),
        KeyMaterial::Base58(b) => bs58::decode(b).into_vec().ok(),
        KeyMaterial::EthereumAddress(_) | KeyMaterial::Pem(_) => None,
    }
}

fn entry_public_key(entry: &PublicKeyEntry) -> Option<VerifyingKey> {
    decode_key_bytes(&entry.material).and_then(|bytes| parse_public_key(&bytes))
}

/// True if `entry` names `key` by address or by explicit key material.
fn entry_matches(entry: &PublicKeyEntry, key: &VerifyingKey, address: &str) -> bool {
    match &entry.material {
        KeyMaterial::EthereumAddress(a) => a.eq_ignore_ascii_case(address),
        _ => entry_public_key(entry).map_or(false, |k| &k == key),
    }
}

fn normalize_recovery_param(v: u8) -> u8 {
    if v >= 27 {
        v - 27
    } else {
        v
    }
}

impl Algorithm {
    /// Signs `signing_input` and returns the base64url signature segment.
    pub fn sign(&self, signing_input: &str, signer: &dyn Signer) -> Result<String> {
        let signature = signer.sign(signing_input.as_bytes())?;
        let mut bytes = signature.to_rs_bytes()?;
        if self.recoverable {
            bytes.push(signature.recovery_param);
        }
        Ok(base64url_encode(&bytes))
    }

    /// Finds the first authenticator that produced `signature` over
    /// `signing_input`.
    ///
    /// # Errors
    /// [`DidError::SignatureInvalid`] if the segment is not a well-formed
    /// signature for this algorithm or no candidate matches.
    pub fn verify<'a>(
        &self,
        signing_input: &str,
        signature: &str,
        authenticators: &'a [PublicKeyEntry],
    ) -> Result<&'a PublicKeyEntry> {
        let raw = base64url_decode(signature)
            .map_err(|e| DidError::SignatureInvalid(format!("signature is not base64url: {}", e)))?;
        let digest = sha256(signing_input.as_bytes());

        let matched = if self.recoverable {
            self.verify_recoverable(&digest, &raw, authenticators)?
        } else {
            self.verify_direct(&digest, &raw, authenticators)?
        };
        matched.ok_or_else(|| DidError::SignatureInvalid("signature does not match any authenticator key".to_string()))
    }

    fn verify_recoverable<'a>(
        &self,
        digest: &[u8],
        raw: &[u8],
        authenticators: &'a [PublicKeyEntry],
    ) -> Result<Option<&'a PublicKeyEntry>> {
        if raw.len() != 65 {
            return Err(DidError::SignatureInvalid(format!(
                "{} signature must be 65 bytes, got {}",
                self.name,
                raw.len()
            )));
        }
        let recovered = match recover_public_key(digest, &raw[..64], normalize_recovery_param(raw[64])) {
            Some(key) => key,
            None => return Ok(None),
        };
        let address = to_ethereum_address(&recovered);
        Ok(authenticators
            .iter()
            .find(|entry| entry_matches(entry, &recovered, &address)))
    }

    fn verify_direct<'a>(
        &self,
        digest: &[u8],
        raw: &[u8],
        authenticators: &'a [PublicKeyEntry],
    ) -> Result<Option<&'a PublicKeyEntry>> {
        if raw.len() != 64 {
            return Err(DidError::SignatureInvalid(format!(
                "{} signature must be 64 bytes, got {}",
                self.name,
                raw.len()
            )));
        }
        Ok(authenticators.iter().find(|entry| match &entry.material {
            KeyMaterial::EthereumAddress(address) => (0..2u8).any(|v| {
                recover_public_key(digest, raw, v)
                    .map_or(false, |key| to_ethereum_address(&key).eq_ignore_ascii_case(address))
            }),
            _ => entry_public_key(entry).map_or(false, |key| verify_prehash(&key, digest, raw)),
        }))
    }
}
