/*
[INPUT]:  Token endpoint responses and raw JWT access tokens
[OUTPUT]: Normalized token grants with resolved expiry timestamps
[POS]:    Auth layer - token response parsing and JWT expiry inference
[UPDATE]: When token response shape or expiry inference changes
*/

use base64::{
    Engine as _,
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

use crate::types::TokenInfo;

/// Body returned by login, register and refresh endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(alias = "access_token")]
    pub access_token: String,
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default, alias = "expires_in")]
    pub expires_in: Option<i64>,
    /// Refresh token lifetime in seconds
    #[serde(default, alias = "refresh_expires_in")]
    pub refresh_expires_in: Option<i64>,
}

/// Credentials issued by the server, expiry resolved.
///
/// `refresh` is `None` when the server kept the existing refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access: TokenInfo,
    pub refresh: Option<TokenInfo>,
}

impl TokenResponse {
    /// Resolve lifetimes against `now`; fall back to the JWT `exp` claim.
    pub fn into_grant(self, now: DateTime<Utc>) -> TokenGrant {
        let access_expiry = self
            .expires_in
            .map(|secs| now + Duration::seconds(secs))
            .or_else(|| decode_expiry(&self.access_token));
        let refresh = self.refresh_token.map(|token| {
            let expiry = self
                .refresh_expires_in
                .map(|secs| now + Duration::seconds(secs))
                .or_else(|| decode_expiry(&token));
            TokenInfo::new(token, expiry)
        });

        TokenGrant {
            access: TokenInfo::new(self.access_token, access_expiry),
            refresh,
        }
    }
}

/// Read the `exp` claim of a JWT without verifying it.
///
/// Returns `None` for opaque tokens or malformed payloads.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload_b64 = token.trim().split('.').nth(1)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .or_else(|_| URL_SAFE.decode(payload_b64))
        .ok()?;
    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).ok()?;
    let exp = payload.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}
