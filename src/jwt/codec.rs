// src/jwt/codec.rs
//! Compact credential tokens: create, decode and verify.
//!
//! Verification resolves the issuer's DID Document through a
//! [`ResolverRegistry`], narrows its keys to those usable for the header's
//! algorithm, checks the signature, then the time window and audience.

use crate::config::ResolverConfig;
use crate::did::address::{is_did_or_mnid, normalize_did};
use crate::did::registry::{now_secs, ResolverRegistry};
use crate::error::{DidError, Result};
use crate::jwt::algorithms::{self, DEFAULT_ALG};
use crate::models::credential::{DecodedCredential, JwtHeader, JwtPayload, VerificationResult};
use crate::models::did::{DIDDocument, PublicKeyEntry};
use crate::utils::serialization::{base64url_decode, encode_section};
use crate::wallet::key_management::Signer;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Seconds of clock skew tolerated on `iat` and `exp`.
pub const IAT_SKEW: u64 = 300;

/// Options for [`create_jwt`].
#[derive(Default, Clone, Copy)]
pub struct CreateOptions<'a> {
    /// DID stamped as `iss`
    pub issuer: Option<&'a str>,
    pub signer: Option<&'a dyn Signer>,
    /// Defaults to [`DEFAULT_ALG`]
    pub alg: Option<&'a str>,
    /// Seconds until `exp`; no `exp` when absent
    pub expires_in: Option<i64>,
    /// Issue time override, Unix seconds
    pub now: Option<u64>,
}

/// Options for [`CredentialCodec::verify_jwt`].
#[derive(Debug, Default, Clone)]
pub struct VerifyOptions {
    /// DID (or MNID) a DID-valued `aud` must match
    pub audience: Option<String>,
    /// URL a URL-valued `aud` must match
    pub callback_url: Option<String>,
    /// Only accept keys referenced by the document's `authentication`
    pub auth: bool,
    /// Verification time override, Unix seconds
    pub now: Option<u64>,
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T> {
    let bytes = base64url_decode(segment)
        .map_err(|e| DidError::MalformedCredential(format!("{} is not base64url: {}", what, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DidError::MalformedCredential(format!("{} is not valid JSON: {}", what, e)))
}

/// Splits a token into header, payload and signature.
///
/// # Errors
/// [`DidError::MalformedCredential`] unless the token is exactly three
/// base64url segments whose first two decode to a header and a payload.
pub fn decode_jwt(jwt: &str) -> Result<DecodedCredential> {
    if jwt.is_empty() {
        return Err(DidError::MalformedCredential("no JWT passed into decode_jwt".to_string()));
    }
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 || !parts.iter().all(|part| is_segment(part)) {
        return Err(DidError::MalformedCredential("incorrect format JWT".to_string()));
    }
    Ok(DecodedCredential {
        header: decode_segment(parts[0], "header")?,
        payload: decode_segment(parts[1], "payload")?,
        signature: parts[2].to_string(),
        data: format!("{}.{}", parts[0], parts[1]),
    })
}

/// Signs `payload` as a token.
///
/// `iat` is stamped with the current time and `exp` with `iat + expires_in`.
/// An `expires_in` of zero means no `exp`, like an absent one. Explicit
/// `iat`/`exp` in `payload` take precedence. `iss` is always the configured
/// issuer.
///
/// # Errors
/// - [`DidError::MissingSigner`] / [`DidError::MissingIssuer`]
/// - [`DidError::InvalidExpiry`] if `expires_in` is negative
/// - [`DidError::UnsupportedAlgorithm`] for an unknown `alg`
pub fn create_jwt(payload: Map<String, Value>, options: &CreateOptions<'_>) -> Result<String> {
    let signer = options.signer.ok_or(DidError::MissingSigner)?;
    let issuer = options
        .issuer
        .filter(|issuer| !issuer.is_empty())
        .ok_or(DidError::MissingIssuer)?;
    let algorithm = algorithms::lookup(options.alg.unwrap_or(DEFAULT_ALG))?;
    let iat = options.now.unwrap_or_else(now_secs);

    let mut body = Map::new();
    body.insert("iat".to_string(), iat.into());
    if let Some(expires_in) = options.expires_in.filter(|expires_in| *expires_in != 0) {
        if expires_in < 0 {
            return Err(DidError::InvalidExpiry(format!("expiresIn must not be negative, got {}", expires_in)));
        }
        let exp = iat
            .checked_add(expires_in as u64)
            .ok_or_else(|| DidError::InvalidExpiry(format!("expiresIn {} overflows", expires_in)))?;
        body.insert("exp".to_string(), exp.into());
    }
    body.extend(payload);
    body.insert("iss".to_string(), issuer.into());

    let header = JwtHeader::new(algorithm.name);
    let signing_input = format!("{}.{}", encode_section(&header)?, encode_section(&body)?);
    let signature = algorithm.sign(&signing_input, signer)?;
    Ok(format!("{}.{}", signing_input, signature))
}

/// Verifies tokens against documents resolved through a registry.
#[derive(Clone)]
pub struct CredentialCodec {
    registry: Arc<ResolverRegistry>,
    /// Method MNIDs are normalized under
    method: String,
    skew: u64,
}

impl CredentialCodec {
    pub fn new(registry: Arc<ResolverRegistry>) -> Self {
        let defaults = ResolverConfig::default();
        Self {
            registry,
            method: defaults.method,
            skew: IAT_SKEW,
        }
    }

    pub fn from_config(registry: Arc<ResolverRegistry>, config: &ResolverConfig) -> Self {
        Self {
            registry,
            method: config.method.clone(),
            skew: config.iat_skew_secs,
        }
    }

    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Normalizes a DID or MNID under this codec's method.
    pub fn normalize_did(&self, value: &str) -> Result<String> {
        normalize_did(value, &self.method)
    }

    /// Resolves `iss` and returns its keys usable for `alg`, in document
    /// order, with the normalized issuer and its document.
    ///
    /// With `auth`, keys must also be referenced by `authentication`.
    pub async fn resolve_authenticator(
        &self,
        alg: &str,
        iss: &str,
        auth: bool,
        now: u64,
    ) -> Result<(Vec<PublicKeyEntry>, String, DIDDocument)> {
        let algorithm = algorithms::lookup(alg)?;
        let issuer = self.normalize_did(iss)?;
        let doc = self.registry.resolve_at(&issuer, now).await?;

        let auth_ids = doc.authentication_key_ids();
        let authenticators: Vec<PublicKeyEntry> = doc
            .public_key
            .iter()
            .filter(|key| algorithm.key_types.contains(&key.key_type.as_str()))
            .filter(|key| !auth || auth_ids.contains(&key.id.as_str()))
            .cloned()
            .collect();

        if authenticators.is_empty() {
            let purpose = if auth { "authenticating user" } else { alg };
            return Err(DidError::SignatureInvalid(format!(
                "DID document for {} does not have public keys suitable for {}",
                issuer, purpose
            )));
        }
        Ok((authenticators, issuer, doc))
    }

    /// Verifies a token.
    ///
    /// # Process Flow
    /// 1. Decode the token
    /// 2. Resolve the issuer and select authenticator keys
    /// 3. Match the signature against them
    /// 4. Check `iat`/`exp` against now, allowing the configured skew
    /// 5. Check `aud` against the expected audience or callback URL
    ///
    /// # Errors
    /// `MalformedCredential`, `UnsupportedAlgorithm`, `SignatureInvalid`,
    /// `NotYetValid`, `Expired`, `AudienceRequired`, `AudienceMismatch`, plus
    /// any resolution error for the issuer.
    pub async fn verify_jwt(&self, jwt: &str, options: &VerifyOptions) -> Result<VerificationResult> {
        let audience = match &options.audience {
            Some(audience) => Some(self.normalize_did(audience)?),
            None => None,
        };
        let now = options.now.unwrap_or_else(now_secs);
        let decoded = decode_jwt(jwt)?;
        let algorithm = algorithms::lookup(&decoded.header.alg)?;

        let (authenticators, issuer, doc) = self
            .resolve_authenticator(&decoded.header.alg, &decoded.payload.iss, options.auth, now)
            .await?;
        let signer = algorithm
            .verify(&decoded.data, &decoded.signature, &authenticators)
            .map_err(|err| {
                warn!("signature check failed for token from {}: {}", issuer, err);
                err
            })?
            .clone();

        let payload = decoded.payload;
        if payload.iat > now.saturating_add(self.skew) {
            return Err(DidError::NotYetValid { iat: payload.iat, now });
        }
        if let Some(exp) = payload.exp {
            if exp.saturating_add(self.skew) < now {
                return Err(DidError::Expired { exp, now });
            }
        }
        if let Some(aud) = &payload.aud {
            check_audience(aud, audience.as_deref(), options.callback_url.as_deref(), &self.method)?;
        }

        debug!("verified token from {} with key {}", issuer, signer.id);
        Ok(VerificationResult {
            payload,
            doc,
            issuer,
            signer,
            jwt: jwt.to_string(),
        })
    }
}

fn check_audience(aud: &str, audience: Option<&str>, callback_url: Option<&str>, method: &str) -> Result<()> {
    if is_did_or_mnid(aud) {
        let expected = audience.ok_or_else(|| {
            DidError::AudienceRequired("JWT audience is required but your app address has not been configured".to_string())
        })?;
        if normalize_did(aud, method)? != expected {
            return Err(DidError::AudienceMismatch(format!(
                "JWT audience does not match your DID: aud: {} != yours: {}",
                aud, expected
            )));
        }
    } else {
        let callback = callback_url.ok_or_else(|| {
            DidError::AudienceRequired("JWT audience matching your callback url is required but one wasn't passed in".to_string())
        })?;
        if aud != callback {
            return Err(DidError::AudienceMismatch(format!(
                "JWT audience does not match the callback url: aud: {} != url: {}",
                aud, callback
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::memory_ledger::InMemoryLedger;
    use crate::did::event_replay::EventReplayResolver;
    use crate::wallet::key_management::KeyManager;
    use serde_json::json;

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        codec: CredentialCodec,
        keys: KeyManager,
    }

    impl Fixture {
        fn new() -> Self {
            let _ = env_logger::builder().is_test(true).try_init();
            let ledger = Arc::new(InMemoryLedger::new());
            let registry = Arc::new(ResolverRegistry::new());
            registry.register_method("ethr", Arc::new(EventReplayResolver::new(ledger.clone(), 100)));
            Self {
                ledger,
                codec: CredentialCodec::new(registry),
                keys: KeyManager::generate(),
            }
        }

        fn did(&self) -> String {
            self.keys.did("ethr")
        }

        fn sign(&self, payload: Value, expires_in: Option<i64>, alg: &str) -> String {
            let did = self.did();
            let options = CreateOptions {
                issuer: Some(&did),
                signer: Some(&self.keys),
                alg: Some(alg),
                expires_in,
                now: Some(NOW),
            };
            create_jwt(payload.as_object().cloned().unwrap_or_default(), &options).unwrap()
        }
    }

    fn at(now: u64) -> VerifyOptions {
        VerifyOptions {
            now: Some(now),
            ..VerifyOptions::default()
        }
    }

    fn tamper(token: &str) -> String {
        let (head, signature) = token.rsplit_once('.').unwrap();
        let mut chars: Vec<char> = signature.chars().collect();
        chars[10] = if chars[10] == 'A' { 'B' } else { 'A' };
        format!("{}.{}", head, chars.into_iter().collect::<String>())
    }

    #[tokio::test]
    async fn test_create_then_verify() {
        let fx = Fixture::new();
        for alg in ["ES256K", "ES256K-R"] {
            let token = fx.sign(json!({"claim": {"name": "Alice"}}), Some(600), alg);
            let result = fx.codec.verify_jwt(&token, &at(NOW)).await.unwrap();
            assert_eq!(result.payload.iss, fx.did());
            assert_eq!(result.payload.iat, NOW);
            assert_eq!(result.payload.exp, Some(NOW + 600));
            assert_eq!(result.payload.claims["claim"]["name"], "Alice");
            assert_eq!(result.issuer, fx.did());
            assert_eq!(result.signer.id, format!("{}#owner", fx.did()));
            assert_eq!(result.jwt, token);
        }
    }

    #[tokio::test]
    async fn test_tampered_signature_fails() {
        let fx = Fixture::new();
        let token = fx.sign(json!({}), None, "ES256K-R");
        let err = fx.codec.verify_jwt(&tamper(&token), &at(NOW)).await.unwrap_err();
        assert!(matches!(err, DidError::SignatureInvalid(_)));
    }

    #[tokio::test]
    async fn test_foreign_signer_fails() {
        let fx = Fixture::new();
        let impostor = KeyManager::generate();
        let did = fx.did();
        let options = CreateOptions {
            issuer: Some(&did),
            signer: Some(&impostor),
            now: Some(NOW),
            ..CreateOptions::default()
        };
        let token = create_jwt(Map::new(), &options).unwrap();
        let err = fx.codec.verify_jwt(&token, &at(NOW)).await.unwrap_err();
        assert!(matches!(err, DidError::SignatureInvalid(_)));
    }

    #[tokio::test]
    async fn test_expiry_window() {
        let fx = Fixture::new();
        let token = fx.sign(json!({}), Some(100), "ES256K-R");
        let exp = NOW + 100;
        assert!(fx.codec.verify_jwt(&token, &at(exp - 1)).await.is_ok());
        assert!(fx.codec.verify_jwt(&token, &at(exp + IAT_SKEW)).await.is_ok());
        let err = fx.codec.verify_jwt(&token, &at(exp + IAT_SKEW + 1)).await.unwrap_err();
        assert!(matches!(err, DidError::Expired { .. }));
    }

    #[tokio::test]
    async fn test_issued_in_future_fails() {
        let fx = Fixture::new();
        let token = fx.sign(json!({}), None, "ES256K-R");
        assert!(fx.codec.verify_jwt(&token, &at(NOW - IAT_SKEW)).await.is_ok());
        let err = fx.codec.verify_jwt(&token, &at(NOW - IAT_SKEW - 1)).await.unwrap_err();
        assert!(matches!(err, DidError::NotYetValid { .. }));
    }

    #[tokio::test]
    async fn test_did_audience() {
        let fx = Fixture::new();
        let audience = "did:ethr:0x1111111111111111111111111111111111111111";
        let token = fx.sign(json!({ "aud": audience }), None, "ES256K-R");

        let ok = VerifyOptions {
            audience: Some(audience.to_string()),
            ..at(NOW)
        };
        assert!(fx.codec.verify_jwt(&token, &ok).await.is_ok());

        let wrong = VerifyOptions {
            audience: Some("did:ethr:0x2222222222222222222222222222222222222222".to_string()),
            ..at(NOW)
        };
        assert!(matches!(
            fx.codec.verify_jwt(&token, &wrong).await,
            Err(DidError::AudienceMismatch(_))
        ));
        assert!(matches!(
            fx.codec.verify_jwt(&token, &at(NOW)).await,
            Err(DidError::AudienceRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_callback_audience() {
        let fx = Fixture::new();
        let token = fx.sign(json!({ "aud": "https://app.example/callback" }), None, "ES256K-R");

        let ok = VerifyOptions {
            callback_url: Some("https://app.example/callback".to_string()),
            ..at(NOW)
        };
        assert!(fx.codec.verify_jwt(&token, &ok).await.is_ok());

        let wrong = VerifyOptions {
            callback_url: Some("https://evil.example/callback".to_string()),
            ..at(NOW)
        };
        assert!(matches!(
            fx.codec.verify_jwt(&token, &wrong).await,
            Err(DidError::AudienceMismatch(_))
        ));
        assert!(matches!(
            fx.codec.verify_jwt(&token, &at(NOW)).await,
            Err(DidError::AudienceRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_auth_only_excludes_verification_delegates() {
        let fx = Fixture::new();
        let delegate = KeyManager::generate();
        fx.ledger
            .add_delegate(fx.keys.address(), "veriKey", delegate.address(), NOW + 3600);

        let did = fx.did();
        let options = CreateOptions {
            issuer: Some(&did),
            signer: Some(&delegate),
            alg: Some("ES256K-R"),
            now: Some(NOW),
            ..CreateOptions::default()
        };
        let token = create_jwt(Map::new(), &options).unwrap();

        let result = fx.codec.verify_jwt(&token, &at(NOW)).await.unwrap();
        assert_eq!(result.signer.id, format!("{}#delegate-1", did));

        let auth_only = VerifyOptions { auth: true, ..at(NOW) };
        assert!(matches!(
            fx.codec.verify_jwt(&token, &auth_only).await,
            Err(DidError::SignatureInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_header_algorithm() {
        let fx = Fixture::new();
        let token = fx.sign(json!({}), None, "ES256K");
        let (_, rest) = token.split_once('.').unwrap();
        let header = encode_section(&json!({"typ": "JWT", "alg": "HS256"})).unwrap();
        let forged = format!("{}.{}", header, rest);
        assert!(matches!(
            fx.codec.verify_jwt(&forged, &at(NOW)).await,
            Err(DidError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for token in ["", "abc", "a.b", "a.b.c.d", "a..c", "a.b.c+"] {
            assert!(matches!(decode_jwt(token), Err(DidError::MalformedCredential(_))), "{}", token);
        }
        let not_json = format!("{}.{}.sig", "bm90anNvbg", "bm90anNvbg");
        assert!(matches!(decode_jwt(&not_json), Err(DidError::MalformedCredential(_))));
    }

    #[test]
    fn test_create_requires_signer_issuer_and_positive_expiry() {
        let keys = KeyManager::generate();
        let did = keys.did("ethr");

        let no_signer = CreateOptions {
            issuer: Some(&did),
            ..CreateOptions::default()
        };
        assert!(matches!(create_jwt(Map::new(), &no_signer), Err(DidError::MissingSigner)));

        let no_issuer = CreateOptions {
            signer: Some(&keys),
            ..CreateOptions::default()
        };
        assert!(matches!(create_jwt(Map::new(), &no_issuer), Err(DidError::MissingIssuer)));

        let bad_expiry = CreateOptions {
            issuer: Some(&did),
            signer: Some(&keys),
            expires_in: Some(-5),
            ..CreateOptions::default()
        };
        assert!(matches!(create_jwt(Map::new(), &bad_expiry), Err(DidError::InvalidExpiry(_))));
    }

    #[test]
    fn test_zero_expiry_means_no_exp() {
        let keys = KeyManager::generate();
        let did = keys.did("ethr");
        let options = CreateOptions {
            issuer: Some(&did),
            signer: Some(&keys),
            expires_in: Some(0),
            now: Some(NOW),
            ..CreateOptions::default()
        };
        let decoded = decode_jwt(&create_jwt(Map::new(), &options).unwrap()).unwrap();
        assert_eq!(decoded.payload.iat, NOW);
        assert!(decoded.payload.exp.is_none());
    }

    #[test]
    fn test_issuer_cannot_be_overridden_by_payload() {
        let keys = KeyManager::generate();
        let did = keys.did("ethr");
        let options = CreateOptions {
            issuer: Some(&did),
            signer: Some(&keys),
            ..CreateOptions::default()
        };
        let payload = json!({"iss": "did:ethr:someone-else"}).as_object().cloned().unwrap();
        let decoded = decode_jwt(&create_jwt(payload, &options).unwrap()).unwrap();
        assert_eq!(decoded.payload.iss, did);
        assert_eq!(decoded.header.typ, "JWT");
        assert_eq!(decoded.header.alg, DEFAULT_ALG);
    }
}
