// src/error.rs
//! Error taxonomy for DID resolution and credential exchange.
//!
//! Every public operation returns either a well-formed result or a
//! [`DidError`] whose [`ErrorKind`] identifies the failure class. Only ledger
//! and content-store outages are marked retryable; nothing in this crate
//! retries on its own.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DidError>;

/// Stable discriminant of a [`DidError`], for callers that branch on the
/// failure class without caring about the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedDid,
    UnsupportedMethod,
    LedgerUnavailable,
    HistoryLimitExceeded,
    MalformedCredential,
    MissingSigner,
    MissingIssuer,
    InvalidExpiry,
    UnsupportedAlgorithm,
    SignatureInvalid,
    NotYetValid,
    Expired,
    AudienceMismatch,
    AudienceRequired,
    ChallengeMissing,
    ChallengeIssuerMismatch,
    ChallengeTypeInvalid,
    InvalidRequestParams,
    UnsupportedAccountType,
    InvalidTypedDataRequest,
    Storage,
    Config,
    Serialization,
}

/// Errors raised while resolving identities or creating/verifying credentials.
#[derive(Error, Debug)]
pub enum DidError {
    /// The string is not `did:<method>:<id>[/path][#fragment]`, or the
    /// identifier is not valid for its method.
    #[error("malformed DID: {0}")]
    MalformedDid(String),

    /// No resolver is registered for the DID method.
    #[error("unsupported DID method: '{0}'")]
    UnsupportedMethod(String),

    /// A ledger read failed or timed out. Safe to retry.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The change-pointer chain was longer than the configured bound.
    #[error("change history for {identity} exceeds {limit} steps")]
    HistoryLimitExceeded { identity: String, limit: usize },

    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    #[error("no signer has been configured")]
    MissingSigner,

    #[error("no issuing DID has been configured")]
    MissingIssuer,

    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No authenticator key of the issuer matches the signature.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("credential not valid yet (issued in the future): iat {iat} > now {now}")]
    NotYetValid { iat: u64, now: u64 },

    #[error("credential has expired: exp {exp} < now {now}")]
    Expired { exp: u64, now: u64 },

    #[error("audience mismatch: {0}")]
    AudienceMismatch(String),

    #[error("audience required: {0}")]
    AudienceRequired(String),

    #[error("challenge was not included in response")]
    ChallengeMissing,

    #[error("challenge issuer does not match current identity: {actual} != {expected}")]
    ChallengeIssuerMismatch { expected: String, actual: String },

    #[error("challenge payload type invalid: {0}")]
    ChallengeTypeInvalid(String),

    #[error("invalid request parameters: {0}")]
    InvalidRequestParams(String),

    #[error("unsupported account type: {0}")]
    UnsupportedAccountType(String),

    #[error("invalid typed data request, must include {0}")]
    InvalidTypedDataRequest(String),

    /// A content-store read or write failed. Safe to retry.
    #[error("content store error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DidError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DidError::MalformedDid(_) => ErrorKind::MalformedDid,
            DidError::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            DidError::LedgerUnavailable(_) => ErrorKind::LedgerUnavailable,
            DidError::HistoryLimitExceeded { .. } => ErrorKind::HistoryLimitExceeded,
            DidError::MalformedCredential(_) => ErrorKind::MalformedCredential,
            DidError::MissingSigner => ErrorKind::MissingSigner,
            DidError::MissingIssuer => ErrorKind::MissingIssuer,
            DidError::InvalidExpiry(_) => ErrorKind::InvalidExpiry,
            DidError::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            DidError::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
            DidError::NotYetValid { .. } => ErrorKind::NotYetValid,
            DidError::Expired { .. } => ErrorKind::Expired,
            DidError::AudienceMismatch(_) => ErrorKind::AudienceMismatch,
            DidError::AudienceRequired(_) => ErrorKind::AudienceRequired,
            DidError::ChallengeMissing => ErrorKind::ChallengeMissing,
            DidError::ChallengeIssuerMismatch { .. } => ErrorKind::ChallengeIssuerMismatch,
            DidError::ChallengeTypeInvalid(_) => ErrorKind::ChallengeTypeInvalid,
            DidError::InvalidRequestParams(_) => ErrorKind::InvalidRequestParams,
            DidError::UnsupportedAccountType(_) => ErrorKind::UnsupportedAccountType,
            DidError::InvalidTypedDataRequest(_) => ErrorKind::InvalidTypedDataRequest,
            DidError::Storage(_) => ErrorKind::Storage,
            DidError::Config(_) => ErrorKind::Config,
            DidError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// True for transient outages of an external collaborator.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DidError::LedgerUnavailable(_) | DidError::Storage(_))
    }
}

impl From<config::ConfigError> for DidError {
    fn from(err: config::ConfigError) -> Self {
        DidError::Config(err.to_string())
    }
}
