// src/services/credentials.rs
//! Credentials Service
//!
//! Per-identity protocol object for selective disclosure between a relying
//! party and a holder:
//! - Disclosure requests and responses, with challenge binding
//! - Verification of disclosures and their nested attestations
//! - Attestations and signature/transaction requests
//!
//! Every message is a compact token signed with `ES256K-R` under the
//! identity's DID.

use crate::error::{DidError, Result};
use crate::jwt::{create_jwt, CreateOptions, CredentialCodec, VerifyOptions};
use crate::models::credential::{JwtPayload, MessageType};
use crate::models::did::DIDDocument;
use crate::utils::serialization::insert_opt;
use crate::wallet::key_management::{KeyManager, Signer};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Algorithm every protocol message is signed with.
pub const PROTOCOL_ALG: &str = "ES256K-R";

/// Default lifetime of requests and responses, in seconds.
pub const DEFAULT_EXPIRY: i64 = 600;

/// Account types a disclosure request may ask for.
pub const ACCOUNT_TYPES: &[&str] = &["general", "segregated", "keypair", "none"];

/// Keys of [`Disclosure`] that disclosed claims may not shadow.
const RESERVED_DISCLOSURE_KEYS: &[&str] = &["did", "publicKey", "deviceKey", "pushToken", "verified", "invalid"];

/// Fields every EIP-712 typed-data request must carry.
const TYPED_DATA_FIELDS: &[&str] = &["types", "primaryType", "message", "domain"];

/// A freshly generated identity.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub did: String,
    pub address: String,
    pub public_key: String,
    pub private_key: String,
}

/// Optional fields of a disclosure request.
#[derive(Debug, Default, Clone)]
pub struct DisclosureRequestParams {
    /// Claims the holder is asked to share
    pub requested: Option<Vec<String>>,
    /// Attestations the holder is asked to share
    pub verified: Option<Vec<String>>,
    /// Expected subject DID
    pub sub: Option<String>,
    /// Ask for permission to send push notifications
    pub notifications: bool,
    pub callback_url: Option<String>,
    pub network_id: Option<String>,
    /// Requires `network_id`
    pub rpc_url: Option<String>,
    /// Tokens describing the requester
    pub vc: Option<Vec<String>>,
    /// Absolute expiry; replaces the relative default
    pub exp: Option<u64>,
    /// One of [`ACCOUNT_TYPES`]
    pub account_type: Option<String>,
}

/// Fields of a plain attestation.
#[derive(Debug, Default, Clone)]
pub struct VerificationParams {
    pub sub: String,
    pub claim: Value,
    pub exp: Option<u64>,
    pub vc: Option<Vec<String>>,
    pub callback_url: Option<String>,
}

/// Options of a request to have a claim signed by someone else.
#[derive(Debug, Default, Clone)]
pub struct VerificationSignatureRequestParams {
    pub aud: Option<String>,
    pub sub: Option<String>,
    /// DID requested to issue the claim
    pub riss: Option<String>,
    pub callback_url: Option<String>,
    pub vc: Option<Vec<String>>,
    pub expires_in: Option<i64>,
}

/// Options shared by typed-data and personal signature requests.
#[derive(Debug, Default, Clone)]
pub struct SignRequestParams {
    pub from: Option<String>,
    pub net: Option<String>,
    pub callback: Option<String>,
}

/// Options of a transaction request.
#[derive(Debug, Clone)]
pub struct TxRequestParams {
    pub callback_url: Option<String>,
    /// Lifetime in seconds
    pub exp: i64,
    pub network_id: Option<String>,
    pub label: Option<String>,
}

impl Default for TxRequestParams {
    fn default() -> Self {
        Self {
            callback_url: None,
            exp: DEFAULT_EXPIRY,
            network_id: None,
            label: None,
        }
    }
}

/// A nested attestation that verified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedClaim {
    #[serde(flatten)]
    pub payload: JwtPayload,
    pub jwt: String,
}

/// What a holder disclosed, after verification.
///
/// `claims` holds the holder's own claims, overridden by their document
/// profile, overridden by any remaining payload fields. It never carries a
/// key of the typed fields, so the issuer in `did` is the verified one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disclosure {
    pub did: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_key: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token: Option<Value>,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
    /// Nested attestations that verified, in disclosure order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<Vec<VerifiedClaim>>,
    /// Nested attestations that failed, unchanged, in disclosure order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid: Option<Vec<String>>,
}

/// Protocol endpoint for one identity.
///
/// An instance without a signer can still verify; creating messages then
/// fails with [`DidError::MissingSigner`].
#[derive(Clone)]
pub struct Credentials {
    did: Option<String>,
    signer: Option<Arc<dyn Signer>>,
    codec: CredentialCodec,
}

impl Credentials {
    /// Creates a verify-only instance with no identity.
    pub fn new(codec: CredentialCodec) -> Self {
        Self {
            did: None,
            signer: None,
            codec,
        }
    }

    /// Creates an instance acting as `did`, signing with `signer`.
    pub fn with_identity(did: impl Into<String>, signer: Arc<dyn Signer>, codec: CredentialCodec) -> Self {
        Self {
            did: Some(did.into()),
            signer: Some(signer),
            codec,
        }
    }

    /// Creates an instance for `keys`, deriving its DID under the codec's
    /// method.
    pub fn from_key_manager(keys: KeyManager, codec: CredentialCodec) -> Self {
        let did = keys.did(codec.method());
        Self::with_identity(did, Arc::new(keys), codec)
    }

    /// Generates a new secp256k1 identity under `method`.
    pub fn create_identity(method: &str) -> Identity {
        let keys = KeyManager::generate();
        Identity {
            did: keys.did(method),
            address: keys.address().to_string(),
            public_key: keys.public_key_hex(),
            private_key: keys.private_key_hex(),
        }
    }

    pub fn did(&self) -> Option<&str> {
        self.did.as_deref()
    }

    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    fn sign_jwt(&self, payload: Map<String, Value>, expires_in: Option<i64>) -> Result<String> {
        create_jwt(
            payload,
            &CreateOptions {
                issuer: self.did.as_deref(),
                signer: self.signer.as_deref(),
                alg: Some(PROTOCOL_ALG),
                expires_in,
                now: None,
            },
        )
    }

    fn own_audience(&self) -> VerifyOptions {
        VerifyOptions {
            audience: self.did.clone(),
            ..VerifyOptions::default()
        }
    }

    /// Creates a signed disclosure request.
    ///
    /// Only the fields set in `params` are carried. Without an explicit
    /// `exp` the request lives for `expires_in` seconds.
    ///
    /// # Errors
    /// - [`DidError::InvalidRequestParams`] if `rpc_url` is set without `network_id`
    /// - [`DidError::UnsupportedAccountType`] for an unknown account type
    pub fn create_disclosure_request(&self, params: &DisclosureRequestParams, expires_in: i64) -> Result<String> {
        let mut payload = Map::new();
        insert_opt(&mut payload, "requested", params.requested.as_ref())?;
        insert_opt(&mut payload, "sub", params.sub.as_ref())?;
        insert_opt(&mut payload, "verified", params.verified.as_ref())?;
        if params.notifications {
            payload.insert("permissions".to_string(), Value::from(vec!["notifications"]));
        }
        insert_opt(&mut payload, "callback", params.callback_url.as_ref())?;
        insert_opt(&mut payload, "net", params.network_id.as_ref())?;
        if let Some(rpc_url) = &params.rpc_url {
            if params.network_id.is_none() {
                return Err(DidError::InvalidRequestParams(
                    "rpcUrl was specified but no networkId".to_string(),
                ));
            }
            payload.insert("rpc".to_string(), rpc_url.clone().into());
        }
        insert_opt(&mut payload, "vc", params.vc.as_ref())?;
        insert_opt(&mut payload, "exp", params.exp)?;
        if let Some(account_type) = &params.account_type {
            if !ACCOUNT_TYPES.contains(&account_type.as_str()) {
                return Err(DidError::UnsupportedAccountType(account_type.clone()));
            }
            payload.insert("act".to_string(), account_type.clone().into());
        }
        payload.insert("type".to_string(), MessageType::DisclosureRequest.as_str().into());

        let expires_in = if params.exp.is_some() { None } else { Some(expires_in) };
        self.sign_jwt(payload, expires_in)
    }

    /// Signs a holder's answer to a disclosure request.
    ///
    /// When `payload` carries the original request as `req`, the request is
    /// verified and its issuer becomes `aud` (and its `sub`, if any, the
    /// response `sub`).
    pub async fn create_disclosure_response(&self, mut payload: Map<String, Value>, expires_in: i64) -> Result<String> {
        if let Some(req) = payload.get("req") {
            let req = req
                .as_str()
                .ok_or_else(|| DidError::MalformedCredential("req must be a token".to_string()))?;
            let request = self.codec.verify_jwt(req, &VerifyOptions::default()).await?;
            payload.insert("aud".to_string(), request.issuer.into());
            if let Some(sub) = request.payload.sub {
                payload.insert("sub".to_string(), sub.into());
            }
        }
        payload.insert("type".to_string(), MessageType::DisclosureResponse.as_str().into());
        self.sign_jwt(payload, Some(expires_in))
    }

    /// Verifies a disclosure response to a request this identity issued.
    ///
    /// # Process Flow
    /// 1. Verify `token` addressed to this identity, authentication keys only
    /// 2. Verify the embedded request `req`
    /// 3. Check the request was issued by this identity as a disclosure request
    /// 4. Process the disclosed payload
    ///
    /// # Errors
    /// [`DidError::ChallengeMissing`], [`DidError::ChallengeIssuerMismatch`],
    /// [`DidError::ChallengeTypeInvalid`], plus any verification failure of
    /// either token.
    pub async fn authenticate_disclosure_response(&self, token: &str, callback_url: Option<&str>) -> Result<Disclosure> {
        let options = VerifyOptions {
            callback_url: callback_url.map(str::to_string),
            auth: true,
            ..self.own_audience()
        };
        let response = self.codec.verify_jwt(token, &options).await?;

        let req = response
            .payload
            .claims
            .get("req")
            .and_then(Value::as_str)
            .ok_or(DidError::ChallengeMissing)?;
        let challenge = self.codec.verify_jwt(req, &VerifyOptions::default()).await?;

        let expected = self.did.clone().unwrap_or_default();
        if challenge.payload.iss != expected {
            return Err(DidError::ChallengeIssuerMismatch {
                expected,
                actual: challenge.payload.iss,
            });
        }
        let challenge_type = challenge.payload.message_type.unwrap_or_default();
        if challenge_type != MessageType::DisclosureRequest.as_str() {
            return Err(DidError::ChallengeTypeInvalid(challenge_type));
        }

        info!("authenticated disclosure response from {}", response.issuer);
        self.process_disclosure_payload(&response.payload, &response.doc).await
    }

    /// Verifies a disclosure addressed to this identity without any
    /// challenge binding, then processes it.
    pub async fn verify_disclosure(&self, token: &str) -> Result<Disclosure> {
        let result = self.codec.verify_jwt(token, &self.own_audience()).await?;
        self.process_disclosure_payload(&result.payload, &result.doc).await
    }

    /// Flattens a verified disclosure payload.
    ///
    /// Nested attestations in `verified` are checked concurrently against
    /// this identity as audience. One failing attestation lands in
    /// `invalid` and never aborts the others.
    pub async fn process_disclosure_payload(&self, payload: &JwtPayload, doc: &DIDDocument) -> Result<Disclosure> {
        let mut rest = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let own = rest.remove("own");
        let capabilities = rest.remove("capabilities");
        let device_key = rest.remove("dad");
        let public_key = rest.remove("publicKey");
        let verified = rest.remove("verified");
        for consumed in ["type", "nad", "iss"] {
            rest.remove(consumed);
        }

        let mut claims = Map::new();
        if let Some(Value::Object(own)) = own {
            claims.extend(own);
        }
        if let Some(Value::Object(profile)) = &doc.profile {
            claims.extend(profile.clone());
        }
        claims.extend(rest);
        for reserved in RESERVED_DISCLOSURE_KEYS {
            if claims.remove(*reserved).is_some() {
                debug!("dropping disclosed claim shadowing '{}'", reserved);
            }
        }

        let push_token = match capabilities {
            Some(Value::Array(mut capabilities)) if capabilities.len() == 1 => capabilities.pop(),
            _ => None,
        };

        let (verified, invalid) = match verified {
            Some(Value::Array(tokens)) => {
                let (verified, invalid) = self.verify_nested(tokens).await;
                (Some(verified), Some(invalid))
            }
            Some(_) => {
                return Err(DidError::MalformedCredential(
                    "verified must be a list of tokens".to_string(),
                ))
            }
            None => (None, None),
        };

        Ok(Disclosure {
            did: payload.iss.clone(),
            public_key,
            device_key,
            push_token,
            claims,
            verified,
            invalid,
        })
    }

    async fn verify_nested(&self, tokens: Vec<Value>) -> (Vec<VerifiedClaim>, Vec<String>) {
        let options = self.own_audience();
        let checks = tokens.iter().map(|token| {
            let options = &options;
            async move {
                match token.as_str() {
                    Some(jwt) => self.codec.verify_jwt(jwt, options).await,
                    None => Err(DidError::MalformedCredential("attestation is not a token".to_string())),
                }
            }
        });
        let results = join_all(checks).await;

        let mut verified = Vec::new();
        let mut invalid = Vec::new();
        for (token, result) in tokens.into_iter().zip(results) {
            match result {
                Ok(result) => verified.push(VerifiedClaim {
                    payload: result.payload,
                    jwt: result.jwt,
                }),
                Err(err) => {
                    warn!("dropping nested attestation: {}", err);
                    invalid.push(match token {
                        Value::String(jwt) => jwt,
                        other => other.to_string(),
                    });
                }
            }
        }
        debug!("nested attestations: {} verified, {} invalid", verified.len(), invalid.len());
        (verified, invalid)
    }

    /// Issues a plain attestation about `sub`.
    pub fn create_verification(&self, params: &VerificationParams) -> Result<String> {
        let mut payload = Map::new();
        payload.insert("sub".to_string(), params.sub.clone().into());
        payload.insert("claim".to_string(), params.claim.clone());
        insert_opt(&mut payload, "exp", params.exp)?;
        insert_opt(&mut payload, "vc", params.vc.as_ref())?;
        insert_opt(&mut payload, "callbackUrl", params.callback_url.as_ref())?;
        self.sign_jwt(payload, None)
    }

    /// Asks another identity to sign `unsigned_claim`.
    pub fn create_verification_signature_request(
        &self,
        unsigned_claim: Value,
        params: &VerificationSignatureRequestParams,
    ) -> Result<String> {
        let mut payload = Map::new();
        payload.insert("unsignedClaim".to_string(), unsigned_claim);
        insert_opt(&mut payload, "sub", params.sub.as_ref())?;
        insert_opt(&mut payload, "riss", params.riss.as_ref())?;
        insert_opt(&mut payload, "aud", params.aud.as_ref())?;
        insert_opt(&mut payload, "vc", params.vc.as_ref())?;
        insert_opt(&mut payload, "callback", params.callback_url.as_ref())?;
        payload.insert("type".to_string(), MessageType::VerificationSignatureRequest.as_str().into());
        self.sign_jwt(payload, params.expires_in)
    }

    /// Requests an EIP-712 typed-data signature.
    ///
    /// # Errors
    /// [`DidError::InvalidTypedDataRequest`] unless `typed_data` carries
    /// `types`, `primaryType`, `message` and `domain`.
    pub fn create_typed_data_signature_request(&self, typed_data: Value, params: &SignRequestParams) -> Result<String> {
        for field in TYPED_DATA_FIELDS {
            let present = typed_data.get(field).map_or(false, is_truthy);
            if !present {
                return Err(DidError::InvalidTypedDataRequest(field.to_string()));
            }
        }
        let mut payload = Map::new();
        payload.insert("typedData".to_string(), typed_data);
        insert_sign_params(&mut payload, params)?;
        payload.insert("type".to_string(), MessageType::TypedDataSignatureRequest.as_str().into());
        self.sign_jwt(payload, None)
    }

    /// Requests a personal-message signature over `data`.
    pub fn create_personal_sign_request(&self, data: &str, params: &SignRequestParams) -> Result<String> {
        let mut payload = Map::new();
        payload.insert("data".to_string(), data.into());
        insert_sign_params(&mut payload, params)?;
        payload.insert("type".to_string(), MessageType::PersonalSignRequest.as_str().into());
        self.sign_jwt(payload, None)
    }

    /// Requests that the holder submit the transaction `tx`.
    pub fn create_tx_request(&self, tx: Map<String, Value>, params: &TxRequestParams) -> Result<String> {
        let mut payload = Map::new();
        insert_opt(&mut payload, "callback", params.callback_url.as_ref())?;
        insert_opt(&mut payload, "net", params.network_id.as_ref())?;
        insert_opt(&mut payload, "label", params.label.as_ref())?;
        payload.extend(tx);
        payload.insert("type".to_string(), MessageType::EthTxRequest.as_str().into());
        self.sign_jwt(payload, Some(params.exp))
    }
}

fn insert_sign_params(payload: &mut Map<String, Value>, params: &SignRequestParams) -> Result<()> {
    insert_opt(payload, "from", params.from.as_ref())?;
    insert_opt(payload, "net", params.net.as_ref())?;
    insert_opt(payload, "callback", params.callback.as_ref())?;
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::memory_ledger::InMemoryLedger;
    use crate::did::event_replay::EventReplayResolver;
    use crate::did::registry::{now_secs, ResolverRegistry};
    use crate::jwt::decode_jwt;
    use serde_json::json;

    fn codec() -> CredentialCodec {
        let _ = env_logger::builder().is_test(true).try_init();
        let registry = Arc::new(ResolverRegistry::new());
        let ledger = Arc::new(InMemoryLedger::new());
        registry.register_method("ethr", Arc::new(EventReplayResolver::new(ledger, 100)));
        CredentialCodec::new(registry)
    }

    fn party(codec: &CredentialCodec) -> Credentials {
        Credentials::from_key_manager(KeyManager::generate(), codec.clone())
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_disclosure_request_fields() {
        let app = party(&codec());
        let params = DisclosureRequestParams {
            requested: Some(vec!["name".into(), "phone".into()]),
            notifications: true,
            callback_url: Some("https://app.example/cb".into()),
            network_id: Some("0x4".into()),
            rpc_url: Some("https://rinkeby.example".into()),
            account_type: Some("keypair".into()),
            ..DisclosureRequestParams::default()
        };
        let token = app.create_disclosure_request(&params, DEFAULT_EXPIRY).unwrap();
        let decoded = decode_jwt(&token).unwrap();

        assert_eq!(decoded.header.alg, PROTOCOL_ALG);
        assert_eq!(decoded.payload.iss, app.did().unwrap());
        assert_eq!(decoded.payload.message_type.as_deref(), Some("shareReq"));
        assert_eq!(decoded.payload.exp, Some(decoded.payload.iat + 600));
        let claims = &decoded.payload.claims;
        assert_eq!(claims["requested"], json!(["name", "phone"]));
        assert_eq!(claims["permissions"], json!(["notifications"]));
        assert_eq!(claims["callback"], "https://app.example/cb");
        assert_eq!(claims["net"], "0x4");
        assert_eq!(claims["rpc"], "https://rinkeby.example");
        assert_eq!(claims["act"], "keypair");
        assert!(!claims.contains_key("vc"));
    }

    #[test]
    fn test_disclosure_request_explicit_exp() {
        let app = party(&codec());
        let params = DisclosureRequestParams {
            exp: Some(2_000_000_000),
            ..DisclosureRequestParams::default()
        };
        let decoded = decode_jwt(&app.create_disclosure_request(&params, DEFAULT_EXPIRY).unwrap()).unwrap();
        assert_eq!(decoded.payload.exp, Some(2_000_000_000));
    }

    #[test]
    fn test_disclosure_request_rejects_bad_params() {
        let app = party(&codec());
        let rpc_only = DisclosureRequestParams {
            rpc_url: Some("https://rpc.example".into()),
            ..DisclosureRequestParams::default()
        };
        assert!(matches!(
            app.create_disclosure_request(&rpc_only, DEFAULT_EXPIRY),
            Err(DidError::InvalidRequestParams(_))
        ));
        let bad_account = DisclosureRequestParams {
            account_type: Some("custodial".into()),
            ..DisclosureRequestParams::default()
        };
        assert!(matches!(
            app.create_disclosure_request(&bad_account, DEFAULT_EXPIRY),
            Err(DidError::UnsupportedAccountType(_))
        ));
    }

    #[test]
    fn test_verify_only_instance_cannot_sign() {
        let verifier = Credentials::new(codec());
        assert!(matches!(
            verifier.create_disclosure_request(&DisclosureRequestParams::default(), DEFAULT_EXPIRY),
            Err(DidError::MissingSigner)
        ));
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let codec = codec();
        let app = party(&codec);
        let user = party(&codec);

        let request = app
            .create_disclosure_request(
                &DisclosureRequestParams {
                    requested: Some(vec!["name".into()]),
                    ..DisclosureRequestParams::default()
                },
                DEFAULT_EXPIRY,
            )
            .unwrap();
        let response = user
            .create_disclosure_response(
                object(json!({"req": request, "own": {"name": "Bob"}, "capabilities": ["push-token"]})),
                DEFAULT_EXPIRY,
            )
            .await
            .unwrap();
        assert_eq!(decode_jwt(&response).unwrap().payload.aud.as_deref(), app.did());

        let disclosure = app.authenticate_disclosure_response(&response, None).await.unwrap();
        assert_eq!(disclosure.did, user.did().unwrap());
        assert_eq!(disclosure.claims["name"], "Bob");
        assert_eq!(disclosure.push_token, Some(json!("push-token")));
        assert!(disclosure.verified.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_missing_or_foreign_challenge() {
        let codec = codec();
        let app = party(&codec);
        let user = party(&codec);
        let stranger = party(&codec);
        let app_did = app.did().unwrap().to_string();

        let unbound = user
            .sign_jwt(object(json!({"aud": app_did, "type": "shareResp"})), Some(600))
            .unwrap();
        assert!(matches!(
            app.authenticate_disclosure_response(&unbound, None).await,
            Err(DidError::ChallengeMissing)
        ));

        let foreign_request = stranger
            .create_disclosure_request(&DisclosureRequestParams::default(), DEFAULT_EXPIRY)
            .unwrap();
        let forged = user
            .sign_jwt(
                object(json!({"aud": app_did, "req": foreign_request, "type": "shareResp"})),
                Some(600),
            )
            .unwrap();
        assert!(matches!(
            app.authenticate_disclosure_response(&forged, None).await,
            Err(DidError::ChallengeIssuerMismatch { .. })
        ));

        let wrong_type = app
            .create_personal_sign_request("hello", &SignRequestParams::default())
            .unwrap();
        let mistyped = user
            .sign_jwt(object(json!({"aud": app_did, "req": wrong_type, "type": "shareResp"})), Some(600))
            .unwrap();
        assert!(matches!(
            app.authenticate_disclosure_response(&mistyped, None).await,
            Err(DidError::ChallengeTypeInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_nested_attestations_keep_order() {
        let codec = codec();
        let app = party(&codec);
        let user = party(&codec);
        let issuer = KeyManager::generate();
        let issuer_did = issuer.did("ethr");
        let app_did = app.did().unwrap().to_string();

        let attest = |payload: Value, now: u64, expires_in: Option<i64>| {
            create_jwt(
                object(payload),
                &CreateOptions {
                    issuer: Some(&issuer_did),
                    signer: Some(&issuer),
                    alg: Some(PROTOCOL_ALG),
                    expires_in,
                    now: Some(now),
                },
            )
            .unwrap()
        };
        let now = now_secs();
        let valid = attest(json!({"sub": app_did, "claim": {"email": "a@b.c"}}), now, Some(3600));
        let expired = attest(json!({"sub": app_did}), now - 10_000, Some(60));
        let mut bad_sig = attest(json!({"sub": app_did}), now, None);
        bad_sig.truncate(bad_sig.len() - 4);
        bad_sig.push_str("AAAA");

        let response = user
            .sign_jwt(
                object(json!({
                    "aud": app_did,
                    "verified": [valid, expired, bad_sig],
                    "own": {"name": "Carol"},
                })),
                Some(600),
            )
            .unwrap();
        let disclosure = app.verify_disclosure(&response).await.unwrap();

        let verified = disclosure.verified.unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].jwt, valid);
        assert_eq!(verified[0].payload.claims["claim"]["email"], "a@b.c");
        assert_eq!(disclosure.invalid.unwrap(), vec![expired, bad_sig]);
        assert_eq!(disclosure.claims["name"], "Carol");
    }

    #[tokio::test]
    async fn test_profile_and_rest_override_own_claims() {
        let app = party(&codec());
        let payload: JwtPayload = serde_json::from_value(json!({
            "iss": "did:ethr:0x1111111111111111111111111111111111111111",
            "iat": 1,
            "own": {"name": "own", "city": "own", "email": "own"},
            "city": "rest",
            "dad": "device-key",
            "nad": "2nQtiQG6Cgm1GYTBaaKAgr76uY7iSexUkqX",
            "capabilities": ["a", "b"]
        }))
        .unwrap();
        let doc = DIDDocument {
            context: crate::models::did::DID_CONTEXT.to_string(),
            id: payload.iss.clone(),
            public_key: vec![],
            authentication: vec![],
            service: vec![],
            profile: Some(json!({"name": "profile", "city": "profile"})),
        };
        let disclosure = app.process_disclosure_payload(&payload, &doc).await.unwrap();
        assert_eq!(disclosure.claims["name"], "profile");
        assert_eq!(disclosure.claims["city"], "rest");
        assert_eq!(disclosure.claims["email"], "own");
        assert_eq!(disclosure.device_key, Some(json!("device-key")));
        assert!(disclosure.push_token.is_none());
        assert!(!disclosure.claims.contains_key("nad"));
        assert!(!disclosure.claims.contains_key("iss"));
    }

    #[tokio::test]
    async fn test_claims_cannot_shadow_verified_fields() {
        let app = party(&codec());
        let holder = "did:ethr:0x1111111111111111111111111111111111111111";
        let payload: JwtPayload = serde_json::from_value(json!({
            "iss": holder,
            "iat": 1,
            "capabilities": ["real-push"],
            "own": {"did": "did:ethr:0x9999999999999999999999999999999999999999", "pushToken": "forged"},
            "invalid": ["smuggled"]
        }))
        .unwrap();
        let doc = DIDDocument {
            context: crate::models::did::DID_CONTEXT.to_string(),
            id: holder.to_string(),
            public_key: vec![],
            authentication: vec![],
            service: vec![],
            profile: Some(json!({"deviceKey": "forged-device"})),
        };
        let disclosure = app.process_disclosure_payload(&payload, &doc).await.unwrap();

        let archived = serde_json::to_value(&disclosure).unwrap();
        assert_eq!(archived["did"], holder);
        assert_eq!(archived["pushToken"], "real-push");
        assert!(archived.get("deviceKey").is_none());
        assert!(archived.get("invalid").is_none());
        for reserved in RESERVED_DISCLOSURE_KEYS {
            assert!(!disclosure.claims.contains_key(*reserved), "{}", reserved);
        }
    }

    #[test]
    fn test_typed_data_requires_all_fields() {
        let app = party(&codec());
        let typed = json!({"types": {}, "primaryType": "Mail", "message": {}, "domain": {}});
        assert!(app
            .create_typed_data_signature_request(typed, &SignRequestParams::default())
            .is_ok());
        let missing = json!({"types": {}, "primaryType": "Mail", "message": {}});
        assert!(matches!(
            app.create_typed_data_signature_request(missing, &SignRequestParams::default()),
            Err(DidError::InvalidTypedDataRequest(_))
        ));
    }

    #[test]
    fn test_tx_request_and_verification() {
        let app = party(&codec());
        let tx = object(json!({"to": "0x2222222222222222222222222222222222222222", "value": "0x01"}));
        let params = TxRequestParams {
            network_id: Some("0x1".into()),
            label: Some("pay".into()),
            ..TxRequestParams::default()
        };
        let decoded = decode_jwt(&app.create_tx_request(tx, &params).unwrap()).unwrap();
        assert_eq!(decoded.payload.message_type.as_deref(), Some("ethtx"));
        assert_eq!(decoded.payload.exp, Some(decoded.payload.iat + 600));
        assert_eq!(decoded.payload.claims["net"], "0x1");
        assert_eq!(decoded.payload.claims["value"], "0x01");

        let attestation = app
            .create_verification(&VerificationParams {
                sub: "did:ethr:0x3333333333333333333333333333333333333333".into(),
                claim: json!({"member": true}),
                ..VerificationParams::default()
            })
            .unwrap();
        let decoded = decode_jwt(&attestation).unwrap();
        assert!(decoded.payload.message_type.is_none());
        assert!(decoded.payload.exp.is_none());
        assert_eq!(decoded.payload.claims["claim"]["member"], true);
    }

    #[test]
    fn test_create_identity() {
        let identity = Credentials::create_identity("ethr");
        assert_eq!(identity.did, format!("did:ethr:{}", identity.address));
        let keys = KeyManager::from_private_key(&identity.private_key).unwrap();
        assert_eq!(keys.address(), identity.address);
        assert_eq!(keys.public_key_hex(), identity.public_key);
    }
}
