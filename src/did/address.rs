// src/did/address.rs
//! DID string parsing/formatting and ledger attribute-name encoding.
//!
//! Attribute names are stored on-chain as `bytes32`: the UTF-8 name,
//! truncated to 32 bytes and right-padded with zeros. Names the resolver
//! understands follow `did/{pub|auth|svc}/<algo>[/<type>][/<encoding>]`.

use crate::error::{DidError, Result};
use crate::models::did::ParsedDid;

/// A `did/...` attribute name split into its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath {
    pub section: AttributeSection,
    pub algorithm: String,
    pub key_type: Option<String>,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSection {
    /// `did/pub/...`: a public key
    PublicKey,
    /// `did/auth/...`: an authentication method
    Authentication,
    /// `did/svc/...`: a service endpoint
    Service,
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_method_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Parses `did:<method>:<id>[/path][#fragment]`.
///
/// # Errors
/// [`DidError::MalformedDid`] if the string is empty, lacks the `did:`
/// scheme, or has an empty or ill-formed method or identifier.
pub fn parse(did: &str) -> Result<ParsedDid> {
    let malformed = || DidError::MalformedDid(format!("invalid DID '{}'", did));
    if did.is_empty() {
        return Err(DidError::MalformedDid("DID not received".to_string()));
    }

    let rest = did.strip_prefix("did:").ok_or_else(malformed)?;
    let (method, rest) = rest.split_once(':').ok_or_else(malformed)?;
    if method.is_empty() || !method.chars().all(is_method_char) {
        return Err(malformed());
    }

    let (before_fragment, fragment) = match rest.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment.to_string())),
        None => (rest, None),
    };
    let (id, path) = match before_fragment.find('/') {
        Some(idx) => (
            &before_fragment[..idx],
            Some(before_fragment[idx..].to_string()),
        ),
        None => (before_fragment, None),
    };
    if id.is_empty() || !id.chars().all(is_id_char) {
        return Err(malformed());
    }

    Ok(ParsedDid {
        method: method.to_string(),
        id: id.to_string(),
        path,
        fragment,
    })
}

/// Formats a parsed DID back to its canonical string; inverse of [`parse`].
pub fn format(did: &ParsedDid) -> String {
    did.to_string()
}

/// True for `0x` followed by exactly 40 hex digits.
pub fn is_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// True for a base58 MNID: version byte 1 followed by network id, a 20-byte
/// address and a 4-byte checksum.
pub fn is_mnid(s: &str) -> bool {
    match bs58::decode(s).into_vec() {
        Ok(data) => data.len() > 24 && data[0] == 1,
        Err(_) => false,
    }
}

/// Normalizes a DID or MNID to a DID string. MNIDs map to
/// `did:<method>:<mnid>`.
///
/// # Errors
/// [`DidError::MalformedDid`] if `value` is neither.
pub fn normalize_did(value: &str, method: &str) -> Result<String> {
    if value.starts_with("did:") {
        Ok(value.to_string())
    } else if is_mnid(value) {
        Ok(format!("did:{}:{}", method, value))
    } else {
        Err(DidError::MalformedDid(format!("not a valid DID '{}'", value)))
    }
}

/// True if `value` looks like a DID or MNID rather than a URL.
pub fn is_did_or_mnid(value: &str) -> bool {
    value.starts_with("did:") || is_mnid(value)
}

/// Encodes a short name as a zero-padded 32-byte ledger key.
/// Names longer than 32 bytes are truncated.
pub fn encode_attribute_name(name: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    let bytes = name.as_bytes();
    let len = bytes.len().min(32);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

/// Decodes a 32-byte ledger key, stripping trailing zero bytes. Invalid
/// UTF-8 is replaced rather than rejected.
pub fn decode_attribute_name(bytes: &[u8; 32]) -> String {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Parses `did/{pub|auth|svc}/<algo>[/<type>][/<encoding>]`.
///
/// Returns `None` for names that do not follow this shape; callers ignore
/// such attributes.
pub fn decode_attribute_path(name: &str) -> Option<AttributePath> {
    let mut segments = name.split('/');
    if segments.next()? != "did" {
        return None;
    }
    let section = match segments.next()? {
        "pub" => AttributeSection::PublicKey,
        "auth" => AttributeSection::Authentication,
        "svc" => AttributeSection::Service,
        _ => return None,
    };
    let algorithm = segments.next().filter(|s| is_word(s))?.to_string();

    let mut optional = Vec::with_capacity(2);
    for segment in segments {
        if optional.len() == 2 || !is_word(segment) {
            return None;
        }
        optional.push(segment.to_string());
    }
    let mut optional = optional.into_iter();

    Some(AttributePath {
        section,
        algorithm,
        key_type: optional.next(),
        encoding: optional.next(),
    })
}
