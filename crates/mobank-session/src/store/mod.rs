/*
[INPUT]:  String keys and string values from session, CSRF and PIN components
[OUTPUT]: Durable key/value persistence behind an async trait
[POS]:    Storage layer - secure store collaborator and its implementations
[UPDATE]: When storage keys or backends change
*/

pub mod file;
pub mod memory;

use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Keys written by the session core.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "session.access_token";
    pub const REFRESH_TOKEN: &str = "session.refresh_token";
    pub const CSRF_TOKEN: &str = "session.csrf_token";
    pub const CSRF_SECRET: &str = "session.csrf_secret";
    pub const LAST_LOGIN: &str = "session.last_login";
    pub const ONBOARDING_COMPLETED: &str = "app.onboarding_completed";
    pub const PIN_CONFIG: &str = "security.pin_config";
    pub const BIOMETRIC_ENABLED: &str = "security.biometric_enabled";
    pub const INACTIVITY_TIMEOUT: &str = "security.inactivity_timeout_ms";

    /// Everything removed when a session is cleared.
    pub const SESSION_KEYS: [&str; 4] = [ACCESS_TOKEN, REFRESH_TOKEN, CSRF_TOKEN, CSRF_SECRET];
}

/// Storage failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable string-keyed storage provided by the host platform.
///
/// `multi_set` must be all-or-nothing.
#[async_trait]
pub trait SecureStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn multi_get(&self, keys: &[&str]) -> StoreResult<Vec<Option<String>>>;

    async fn multi_set(&self, entries: &[(&str, String)]) -> StoreResult<()>;

    /// Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Decode an optional JSON string already fetched with `multi_get`.
pub fn decode_json<T: DeserializeOwned>(raw: Option<&String>) -> StoreResult<Option<T>> {
    raw.map(|raw| serde_json::from_str(raw))
        .transpose()
        .map_err(StoreError::from)
}
