/*
[INPUT]:  Session, PIN and activity domain definitions
[OUTPUT]: Typed Rust structs with serialization support
[POS]:    Data layer - persisted and in-memory models
[UPDATE]: When persisted shapes change or new types added
*/

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{ActivityKind, PinLength};

/// A single credential with optional expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenInfo {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Token without a known expiry.
    pub fn unbounded(token: impl Into<String>) -> Self {
        Self::new(token, None)
    }

    /// Unknown expiry counts as usable.
    pub fn is_expired_at(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + leeway >= expires_at,
            None => false,
        }
    }
}

/// Access + refresh credentials owned by the token manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: TokenInfo,
    pub refresh: TokenInfo,
}

impl TokenPair {
    pub fn new(access: TokenInfo, refresh: TokenInfo) -> Self {
        Self { access, refresh }
    }
}

/// Anti-forgery material attached to state-mutating requests.
///
/// Only constructible with both halves present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfMaterial {
    pub token: String,
    pub secret: String,
}

impl CsrfMaterial {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }

    /// Pair two optional halves; a lone half is discarded.
    pub fn from_parts(token: Option<String>, secret: Option<String>) -> Option<Self> {
        match (token, secret) {
            (Some(token), Some(secret)) if !token.is_empty() && !secret.is_empty() => {
                Some(Self { token, secret })
            }
            _ => None,
        }
    }
}

/// Persisted PIN configuration. Its presence means a PIN is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinConfig {
    pub length: PinLength,
    pub hash: String,
    pub biometric_enabled: bool,
    pub inactivity_timeout_ms: u64,
    pub failed_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockout_until: Option<DateTime<Utc>>,
}

impl PinConfig {
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.is_some_and(|until| now < until)
    }

    /// Remaining lockout time, if any.
    pub fn lockout_remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.lockout_until
            .filter(|until| now < *until)
            .and_then(|until| (until - now).to_std().ok())
    }
}

/// One observed user, network or lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySample {
    pub kind: ActivityKind,
    pub at: DateTime<Utc>,
}
