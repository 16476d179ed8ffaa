// src/models/did.rs
//! Decentralized Identifier (DID) data model implementation.
//!
//! Defines the parsed DID and the W3C-style DID Document derived from an
//! identity's on-chain change history, following the
//! [DID Core Specification](https://www.w3.org/TR/did-core/).
//!
//! Documents are read-models: they are never persisted, only recomputed on
//! every resolution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON-LD context stamped on every resolved document.
pub const DID_CONTEXT: &str = "https://w3id.org/did/v1";

/// Key type of the owner key and of `veriKey`/`sigAuth` delegates.
pub const SECP256K1_VERIFICATION_KEY: &str = "Secp256k1VerificationKey2018";

/// Authentication type referencing a secp256k1 key.
pub const SECP256K1_SIGNATURE_AUTHENTICATION: &str = "Secp256k1SignatureAuthentication2018";

/// A parsed Decentralized Identifier.
///
/// Canonical form is `did:<method>:<id>[/path][#fragment]`. `path` keeps its
/// leading `/`; `fragment` excludes the `#`. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedDid {
    pub method: String,
    pub id: String,
    pub path: Option<String>,
    pub fragment: Option<String>,
}

impl ParsedDid {
    /// The DID without path or fragment, `did:<method>:<id>`.
    pub fn base(&self) -> String {
        format!("did:{}:{}", self.method, self.id)
    }
}

impl fmt::Display for ParsedDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.id)?;
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

/// Key material carried by a [`PublicKeyEntry`]. Exactly one representation
/// is present; it serializes as a single field of the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyMaterial {
    #[serde(rename = "ethereumAddress")]
    EthereumAddress(String),
    #[serde(rename = "publicKeyHex")]
    Hex(String),
    #[serde(rename = "publicKeyBase64")]
    Base64(String),
    #[serde(rename = "publicKeyBase58")]
    Base58(String),
    #[serde(rename = "publicKeyPem")]
    Pem(String),
    /// Attribute value with an unrecognized encoding, kept as `0x` hex.
    #[serde(rename = "value")]
    Raw(String),
}

/// A public key listed in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyEntry {
    /// `<did>#owner` or `<did>#delegate-<n>`
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: String,
    /// DID controlling this key
    pub owner: String,
    #[serde(flatten)]
    pub material: KeyMaterial,
}

/// An authentication method referencing a [`PublicKeyEntry`] by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationEntry {
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// A service endpoint published through a `did/svc/<type>` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

/// A DID Document representing a decentralized identity.
///
/// # Fields
/// - `id`: The DID the document describes
/// - `public_key`: Owner key first, then live delegate keys in id order
/// - `authentication`: Owner authentication first, then live delegates
/// - `service`: Published service endpoints, omitted when empty
/// - `profile`: Optional public profile supplied by resolvers that have one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DIDDocument {
    #[serde(rename = "@context")]
    pub context: String,

    pub id: String,

    #[serde(rename = "publicKey")]
    pub public_key: Vec<PublicKeyEntry>,

    pub authentication: Vec<AuthenticationEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceEndpoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
}

impl DIDDocument {
    /// Ids of the keys referenced by the document's authentication entries.
    pub fn authentication_key_ids(&self) -> Vec<&str> {
        self.authentication
            .iter()
            .map(|auth| auth.public_key.as_str())
            .collect()
    }
}
