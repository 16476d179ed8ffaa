// tests/journey.rs
//! End-to-end: identities, ledger changes, disclosure exchange and archiving.

use did_credentials::blockchain::memory_ledger::InMemoryLedger;
use did_credentials::did::event_replay::EventReplayResolver;
use did_credentials::did::registry::{now_secs, ResolverRegistry};
use did_credentials::error::DidError;
use did_credentials::jwt::{create_jwt, CreateOptions, CredentialCodec};
use did_credentials::services::credentials::{Credentials, DisclosureRequestParams, DEFAULT_EXPIRY};
use did_credentials::storage::memory_store::MemoryStore;
use did_credentials::storage::store::Store;
use did_credentials::wallet::key_management::KeyManager;
use serde_json::{json, Value};
use std::sync::Arc;

struct World {
    ledger: Arc<InMemoryLedger>,
    registry: Arc<ResolverRegistry>,
    codec: CredentialCodec,
}

fn world() -> World {
    let _ = env_logger::builder().is_test(true).try_init();
    let ledger = Arc::new(InMemoryLedger::new());
    let registry = Arc::new(ResolverRegistry::new());
    registry.register_method("ethr", Arc::new(EventReplayResolver::new(ledger.clone(), 1000)));
    let codec = CredentialCodec::new(registry.clone());
    World { ledger, registry, codec }
}

#[tokio::test]
async fn test_fresh_identity_has_only_owner_key() {
    let w = world();
    let identity = Credentials::create_identity("ethr");
    let doc = w.registry.resolve(&identity.did).await.unwrap();
    assert_eq!(doc.id, identity.did);
    assert_eq!(doc.public_key.len(), 1);
    assert_eq!(doc.authentication.len(), 1);
    assert_eq!(doc.authentication[0].public_key, doc.public_key[0].id);
}

#[tokio::test]
async fn test_delegate_lifetime() {
    let w = world();
    let owner = KeyManager::generate();
    let delegate = KeyManager::generate();
    let did = owner.did("ethr");
    let now = now_secs();

    w.ledger.add_delegate(owner.address(), "veriKey", delegate.address(), now + 3600);
    w.ledger
        .set_attribute(owner.address(), "did/svc/HubService", b"https://hub.example", now + 3600);

    let live = w.registry.resolve_at(&did, now + 1800).await.unwrap();
    let ids: Vec<&str> = live.public_key.iter().map(|k| k.id.as_str()).collect();
    assert_eq!(ids, vec![format!("{}#owner", did), format!("{}#delegate-1", did)]);
    assert_eq!(live.service.len(), 1);
    assert_eq!(live.service[0].service_endpoint, "https://hub.example");

    let later = w.registry.resolve_at(&did, now + 7200).await.unwrap();
    assert_eq!(later.public_key.len(), 1);
    assert!(later.service.is_empty());
}

#[tokio::test]
async fn test_disclosure_journey() {
    let w = world();
    let app = Credentials::from_key_manager(KeyManager::generate(), w.codec.clone());
    let app_did = app.did().unwrap().to_string();

    // The holder signs through a sigAuth delegate rather than the owner key.
    let holder = KeyManager::generate();
    let device = KeyManager::generate();
    let holder_did = holder.did("ethr");
    w.ledger
        .add_delegate(holder.address(), "sigAuth", device.address(), now_secs() + 86_400);
    let user = Credentials::with_identity(holder_did.clone(), Arc::new(device), w.codec.clone());

    let issuer = KeyManager::generate();
    let issuer_did = issuer.did("ethr");
    let attestation = create_jwt(
        json!({"sub": holder_did, "claim": {"employer": "Acme"}})
            .as_object()
            .cloned()
            .unwrap(),
        &CreateOptions {
            issuer: Some(&issuer_did),
            signer: Some(&issuer),
            alg: Some("ES256K-R"),
            expires_in: Some(3600),
            now: None,
        },
    )
    .unwrap();

    let request = app
        .create_disclosure_request(
            &DisclosureRequestParams {
                requested: Some(vec!["name".into()]),
                verified: Some(vec!["employer".into()]),
                callback_url: Some("https://app.example/callback".into()),
                ..DisclosureRequestParams::default()
            },
            DEFAULT_EXPIRY,
        )
        .unwrap();

    let response = user
        .create_disclosure_response(
            json!({
                "req": request,
                "own": {"name": "Dana"},
                "verified": [attestation, "not-a-token"],
                "capabilities": ["push-abc"],
            })
            .as_object()
            .cloned()
            .unwrap(),
            DEFAULT_EXPIRY,
        )
        .await
        .unwrap();

    let disclosure = app
        .authenticate_disclosure_response(&response, Some("https://app.example/callback"))
        .await
        .unwrap();
    assert_eq!(disclosure.did, holder_did);
    assert_eq!(disclosure.claims["name"], "Dana");
    assert_eq!(disclosure.claims["aud"], app_did);
    assert_eq!(disclosure.push_token, Some(json!("push-abc")));
    let verified = disclosure.verified.clone().unwrap();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0].payload.iss, issuer_did);
    assert_eq!(disclosure.invalid.clone().unwrap(), vec!["not-a-token".to_string()]);

    let store = Store::new(Arc::new(MemoryStore::new()));
    let hash = store.put_json(&disclosure).await.unwrap();
    let archived: Value = store.get_json(&hash).await.unwrap();
    assert_eq!(archived["did"], holder_did.as_str());
    assert_eq!(archived["pushToken"], "push-abc");
    assert_eq!(archived["verified"][0]["jwt"], verified[0].jwt.as_str());
}

#[tokio::test]
async fn test_ledger_outage_is_retryable() {
    let w = world();
    let identity = Credentials::create_identity("ethr");
    w.ledger.set_offline(true);
    let err = w.registry.resolve(&identity.did).await.unwrap_err();
    assert!(matches!(err, DidError::LedgerUnavailable(_)));
    assert!(err.is_retryable());

    w.ledger.set_offline(false);
    assert!(w.registry.resolve(&identity.did).await.is_ok());
}

#[tokio::test]
async fn test_unknown_method() {
    let w = world();
    let err = w.registry.resolve("did:web:example.com").await.unwrap_err();
    assert!(matches!(err, DidError::UnsupportedMethod(_)));
}
