/*
[INPUT]:  Session configuration, secure store, connectivity
[OUTPUT]: Established, persisted and torn-down sessions
[POS]:    Auth layer - composition root for login, registration and logout
[UPDATE]: When login/registration contracts or logout semantics change
*/

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::auth::jwt::TokenResponse;
use crate::auth::TokenManager;
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::http::{
    ApiClient, ApiError, ApiRequest, AuthApi, Connectivity, HttpTokenRefresher, Result, RetryPolicy,
    Transport,
};
use crate::store::{keys, SecureStore};
use crate::types::TokenPair;

/// Username/password login body. Wiped from memory on drop.
#[derive(Clone, Serialize, Zeroize, ZeroizeOnDrop)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registration body; `profile` carries any extra fields the backend expects.
#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(flatten)]
    pub profile: BTreeMap<String, serde_json::Value>,
}

impl RegisterRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            profile: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.profile.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("profile", &self.profile.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for RegisterRequest {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Owns the session lifecycle: login, registration, logout and expiry.
#[derive(Debug, Clone)]
pub struct SessionManager {
    client: ApiClient,
    tokens: TokenManager,
    store: Arc<dyn SecureStore>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(client: ApiClient, store: Arc<dyn SecureStore>) -> Self {
        Self::with_clock(client, store, Arc::new(SystemClock))
    }

    pub fn with_clock(client: ApiClient, store: Arc<dyn SecureStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: client.tokens().clone(),
            client,
            store,
            clock,
        }
    }

    /// Wire transport, refresher, token manager and pipeline from configuration.
    pub fn from_config(
        config: &SessionConfig,
        store: Arc<dyn SecureStore>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self> {
        Self::from_config_with_clock(config, store, connectivity, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(
        config: &SessionConfig,
        store: Arc<dyn SecureStore>,
        connectivity: Arc<dyn Connectivity>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate().map_err(ApiError::Config)?;

        let transport = Transport::with_connectivity(&config.api, connectivity)?;
        let auth_api = AuthApi::with_clock(transport.clone(), clock.clone());
        let refresher = Arc::new(HttpTokenRefresher::new(auth_api.clone()));
        let tokens = TokenManager::with_clock(
            store.clone(),
            refresher,
            clock.clone(),
            config.session.expiry_leeway(),
        );
        let client = ApiClient::new(transport, tokens, store.clone())
            .with_auth_api(auth_api)
            .with_retry(RetryPolicy::from(&config.retry))
            .with_server_logout_on_expiry(config.session.server_logout_on_expiry);

        Ok(Self::with_clock(client, store, clock))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Authenticate and persist the issued pair
    ///
    /// POST {login}. A rejected login leaves any stored session untouched.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<TokenPair> {
        let _establishing = self.tokens.begin_establishing();
        let endpoint = self.client.transport().endpoints().login.clone();
        let request = ApiRequest::post(endpoint).with_json(credentials)?;

        let response: Option<TokenResponse> = self.client.send(request).await?;
        let response =
            response.ok_or_else(|| ApiError::InvalidResponse("login returned an empty body".into()))?;
        let pair = self.start_session(response).await?;
        info!(username = %credentials.username, "login succeeded");
        Ok(pair)
    }

    /// Create an account. Returns true when the backend also opened a session.
    ///
    /// POST {register}
    pub async fn register(&self, request: &RegisterRequest) -> Result<bool> {
        let _establishing = self.tokens.begin_establishing();
        let endpoint = self.client.transport().endpoints().register.clone();
        let api_request = ApiRequest::post(endpoint).with_json(request)?;

        let body: Option<serde_json::Value> = self.client.send(api_request).await?;
        let Some(response) = body.and_then(|value| serde_json::from_value::<TokenResponse>(value).ok())
        else {
            info!(username = %request.username, "registration accepted; login still required");
            return Ok(false);
        };

        self.start_session(response).await?;
        info!(username = %request.username, "registration opened a session");
        Ok(true)
    }

    /// End the session on request of the user.
    ///
    /// The server call is best-effort; local state is always cleared.
    pub async fn logout(&self) -> Result<()> {
        match self.tokens.current_pair().await {
            Ok(Some(pair)) => {
                if let Err(err) = self.client.auth_api().logout(&pair.access.token).await {
                    warn!(error = %err, "server logout failed; clearing local session anyway");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "could not read session before logout"),
        }
        self.tokens.clear_tokens().await?;
        info!("logged out");
        Ok(())
    }

    /// Drop the session as if the server had rejected it.
    pub async fn expire_session(&self) {
        self.client.expire_session().await;
    }

    pub async fn has_session(&self) -> Result<bool> {
        self.tokens.has_session().await
    }

    pub async fn last_login(&self) -> Result<Option<DateTime<Utc>>> {
        let raw = self.store.get(keys::LAST_LOGIN).await?;
        Ok(raw.and_then(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|parsed| parsed.with_timezone(&Utc))
                .ok()
        }))
    }

    pub async fn mark_onboarding_complete(&self) -> Result<()> {
        self.store.set(keys::ONBOARDING_COMPLETED, "true").await?;
        Ok(())
    }

    pub async fn is_onboarding_complete(&self) -> Result<bool> {
        Ok(self.store.get(keys::ONBOARDING_COMPLETED).await?.as_deref() == Some("true"))
    }

    async fn start_session(&self, response: TokenResponse) -> Result<TokenPair> {
        let now = self.clock.now();
        let grant = response.into_grant(now);
        let refresh = grant.refresh.ok_or_else(|| {
            ApiError::InvalidResponse("session response is missing a refresh token".into())
        })?;
        let pair = TokenPair::new(grant.access, refresh);
        self.tokens.set_tokens(pair.clone()).await?;

        if let Err(err) = self.store.set(keys::LAST_LOGIN, &now.to_rfc3339()).await {
            warn!(error = %err, "failed to record last login time");
        }
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = LoginCredentials::new("alice", "hunter2");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_register_request_flattens_profile() {
        let request = RegisterRequest::new("bob", "pw")
            .with_field("phone", serde_json::json!("+15550100"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["username"], "bob");
        assert_eq!(value["phone"], "+15550100");
        assert!(!format!("{request:?}").contains("pw\""));
    }
}
