// src/utils/crypto.rs
//! Cryptographic utilities optimized for blockchain compatibility.
//!
//! - Keccak-256 (Ethereum's standard hash) for address derivation
//! - SHA-256 (via `ring`) as the credential signing digest
//! - secp256k1 public key recovery and verification (via `k256`)

use ethers::utils::{hex, keccak256};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use ring::digest::{digest, SHA256};

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Computes the SHA-256 digest that credential signatures are made over.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// Derives the `0x`-prefixed lowercase Ethereum address of a public key.
///
/// The address is the last 20 bytes of the Keccak-256 hash of the
/// uncompressed point, without its `0x04` tag.
pub fn to_ethereum_address(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = hash_data(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Parses a SEC1 encoded public key (compressed or uncompressed).
pub fn parse_public_key(bytes: &[u8]) -> Option<VerifyingKey> {
    VerifyingKey::from_sec1_bytes(bytes).ok()
}

/// Recovers the signer's public key from a 64-byte `r || s` signature over
/// `prehash` and a recovery parameter (0 or 1).
pub fn recover_public_key(prehash: &[u8], rs: &[u8], recovery_param: u8) -> Option<VerifyingKey> {
    let signature = Signature::from_slice(rs).ok()?;
    let recovery_id = RecoveryId::from_byte(recovery_param)?;
    VerifyingKey::recover_from_prehash(prehash, &signature, recovery_id).ok()
}

/// Verifies a 64-byte `r || s` signature over `prehash` against `key`.
pub fn verify_prehash(key: &VerifyingKey, prehash: &[u8], rs: &[u8]) -> bool {
    match Signature::from_slice(rs) {
        Ok(signature) => key.verify_prehash(prehash, &signature).is_ok(),
        Err(_) => false,
    }
}
