/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for mobank-session tests

#![allow(dead_code)]

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use mobank_session::{
    MemoryStore, PinSecurityController, SecureStore, SessionConfig, SessionEvent, SessionManager,
    SharedConnectivity, TokenInfo, TokenPair,
};
use parking_lot::Mutex;
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Config pointing at the mock server, with fast retries and cheap hashing
pub fn test_config(base_url: &str) -> SessionConfig {
    let mut config = SessionConfig::default();
    config.api.base_url = base_url.to_string();
    config.api.timeout_ms = 5_000;
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    config.pin.hash_memory_kib = 64;
    config.pin.hash_iterations = 1;
    config.pin.hash_parallelism = 1;
    config
}

/// Everything a test needs to drive a session against the mock server
pub struct Harness {
    pub session: SessionManager,
    pub store: Arc<MemoryStore>,
    pub connectivity: SharedConnectivity,
    pub events: Arc<Mutex<Vec<SessionEvent>>>,
}

pub fn harness(server: &MockServer) -> Harness {
    harness_with(test_config(&server.uri()))
}

pub fn harness_with(config: SessionConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let connectivity = SharedConnectivity::default();
    let session = SessionManager::from_config(&config, store.clone(), Arc::new(connectivity.clone()))
        .expect("session should build");
    let events = record_events(&session);
    Harness {
        session,
        store,
        connectivity,
        events,
    }
}

pub fn record_events(session: &SessionManager) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in [SessionEvent::TokenExpired, SessionEvent::LoginRequired] {
        let sink = events.clone();
        session.tokens().on(kind, move |event| sink.lock().push(event));
    }
    events
}

/// Unsigned JWT whose `exp` is `offset` from now
pub fn make_jwt(subject: &str, offset: Duration) -> String {
    let header = serde_json::json!({"alg": "none", "typ": "JWT"});
    let claims = serde_json::json!({
        "sub": subject,
        "exp": (Utc::now() + offset).timestamp(),
    });
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
    format!("{header_b64}.{payload_b64}.signature")
}

pub fn valid_pair(access: &str) -> TokenPair {
    TokenPair::new(
        TokenInfo::new(access, Some(Utc::now() + Duration::hours(1))),
        TokenInfo::unbounded("refresh-1"),
    )
}

pub fn expired_pair() -> TokenPair {
    TokenPair::new(
        TokenInfo::new("stale-access", Some(Utc::now() - Duration::minutes(10))),
        TokenInfo::unbounded("refresh-1"),
    )
}

pub async fn seed_csrf(store: &MemoryStore, token: &str, secret: &str) {
    store
        .multi_set(&[
            (mobank_session::store::keys::CSRF_TOKEN, token.to_string()),
            (mobank_session::store::keys::CSRF_SECRET, secret.to_string()),
        ])
        .await
        .unwrap();
}

pub async fn pin_controller(store: Arc<dyn SecureStore>) -> PinSecurityController {
    let config = test_config("http://localhost");
    PinSecurityController::load(store, config.pin)
        .await
        .expect("controller should load")
}
