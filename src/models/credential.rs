// src/models/credential.rs
//! Signed credential data model.
//!
//! A credential is a compact, JWT-style token:
//! `base64url(JSON(header)).base64url(JSON(payload)).base64url(signature)`.
//! The payload is a typed struct of the registered claims plus one open map
//! for everything else, so unknown fields survive a decode/re-encode.

use crate::models::did::{DIDDocument, PublicKeyEntry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token header. `typ` is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub typ: String,
    pub alg: String,
}

impl JwtHeader {
    pub fn new(alg: &str) -> Self {
        Self {
            typ: "JWT".to_string(),
            alg: alg.to_string(),
        }
    }
}

/// Token payload: registered claims plus all remaining claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtPayload {
    /// Issuer DID
    pub iss: String,

    /// Issued-at, seconds since the Unix epoch
    pub iat: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Intended audience: a DID, an MNID or a callback URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Protocol message tag, see [`MessageType`]
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,

    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// A token split into its parts. `data` is the signing input
/// (`header.payload` exactly as transmitted).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCredential {
    pub header: JwtHeader,
    pub payload: JwtPayload,
    pub signature: String,
    pub data: String,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub payload: JwtPayload,
    /// The issuer's document as resolved for this verification
    pub doc: DIDDocument,
    /// Normalized issuer DID
    pub issuer: String,
    /// The document key the signature matched
    pub signer: PublicKeyEntry,
    /// The verified token, unchanged
    pub jwt: String,
}

/// `type` tags of the protocol messages built by
/// [`Credentials`](crate::services::credentials::Credentials).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    DisclosureRequest,
    DisclosureResponse,
    TypedDataSignatureRequest,
    VerificationSignatureRequest,
    EthTxRequest,
    PersonalSignRequest,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::DisclosureRequest => "shareReq",
            MessageType::DisclosureResponse => "shareResp",
            MessageType::TypedDataSignatureRequest => "eip712Req",
            MessageType::VerificationSignatureRequest => "verReq",
            MessageType::EthTxRequest => "ethtx",
            MessageType::PersonalSignRequest => "personalSigReq",
        }
    }
}
