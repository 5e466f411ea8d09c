/*
[INPUT]:  Transport, token manager, CSRF cache, retry policy, activity monitor
[OUTPUT]: Typed API responses with auth/CSRF injection, retry and 401 handling
[POS]:    HTTP layer - request pipeline every protected call goes through
[UPDATE]: When header policy, retry rules or session expiry handling change
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::activity::ActivityMonitor;
use crate::auth::TokenManager;
use crate::http::auth_api::AuthApi;
use crate::http::csrf::CsrfCache;
use crate::http::{ApiError, Result, RetryPolicy, Transport};
use crate::store::SecureStore;
use crate::types::{ActivityKind, CsrfMaterial};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// One logical API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Whether the pipeline may repeat the call on retriable failures.
    pub retry_safe: bool,
}

impl ApiRequest {
    /// GET and HEAD are retry-safe by default; everything else must opt in.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let retry_safe = matches!(method, Method::GET | Method::HEAD);
        Self {
            method,
            path: path.into(),
            body: None,
            retry_safe,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_json<B: Serialize>(self, body: &B) -> Result<Self> {
        Ok(self.with_body(serde_json::to_value(body)?))
    }

    pub fn retry_safe(mut self, safe: bool) -> Self {
        self.retry_safe = safe;
        self
    }

    /// State-mutating methods carry CSRF material.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

/// API client that runs every call through the auth/retry pipeline.
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Transport,
    tokens: TokenManager,
    csrf: CsrfCache,
    auth_api: AuthApi,
    retry: RetryPolicy,
    activity: Option<ActivityMonitor>,
    server_logout_on_expiry: bool,
}

impl ApiClient {
    pub fn new(transport: Transport, tokens: TokenManager, store: Arc<dyn SecureStore>) -> Self {
        Self {
            auth_api: AuthApi::new(transport.clone()),
            transport,
            tokens,
            csrf: CsrfCache::new(store),
            retry: RetryPolicy::default(),
            activity: None,
            server_logout_on_expiry: false,
        }
    }

    pub fn with_auth_api(mut self, auth_api: AuthApi) -> Self {
        self.auth_api = auth_api;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Report every call as `ApiCall` activity.
    pub fn with_activity_monitor(mut self, monitor: ActivityMonitor) -> Self {
        self.activity = Some(monitor);
        self
    }

    /// Also call the logout endpoint when a 401 expires the session.
    pub fn with_server_logout_on_expiry(mut self, enabled: bool) -> Self {
        self.server_logout_on_expiry = enabled;
        self
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn auth_api(&self) -> &AuthApi {
        &self.auth_api
    }

    pub fn csrf(&self) -> &CsrfCache {
        &self.csrf
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        self.send(ApiRequest::post(path).with_body(body)).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        self.send(ApiRequest::put(path).with_body(body)).await
    }

    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        self.send(ApiRequest::patch(path).with_body(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Run a request through the pipeline.
    ///
    /// Offline fails before any attempt. Retry-safe requests are retried per
    /// the retry policy; a 401 on a protected endpoint ends the session and
    /// is never retried.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.transport.ensure_online()?;
        if let Some(monitor) = &self.activity {
            monitor.record_activity(ActivityKind::ApiCall);
        }

        let is_auth = self.transport.endpoints().is_auth_endpoint(&request.path);
        let policy = if request.retry_safe {
            self.retry.clone()
        } else {
            RetryPolicy::none()
        };

        let auth_handled = AtomicBool::new(false);
        let request = &request;
        let auth_handled = &auth_handled;
        policy
            .run(move || self.attempt(request, is_auth, auth_handled))
            .await
    }

    /// Drop the local session, optionally telling the server first.
    pub async fn expire_session(&self) {
        if self.server_logout_on_expiry {
            if let Ok(Some(pair)) = self.tokens.current_pair().await {
                if let Err(err) = self.auth_api.logout(&pair.access.token).await {
                    debug!(error = %err, "server logout on expiry failed");
                }
            }
        }
        self.tokens.expire_session().await;
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        is_auth: bool,
        auth_handled: &AtomicBool,
    ) -> Result<T> {
        self.transport.ensure_online()?;
        let mut builder = self
            .transport
            .request(request.method.clone(), &request.path)?
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());

        // auth endpoints never carry a possibly stale token
        if !is_auth {
            let access_token = self.tokens.get_valid_access_token().await?;
            if let Some(token) = &access_token {
                builder = builder.bearer_auth(token);
            }
            if request.is_mutating() {
                if let Some(material) = self.csrf_material(access_token.as_deref()).await {
                    builder = CsrfCache::apply(builder, &material);
                }
            }
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, path = %request.path, "sending request");
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            self.csrf.harvest(response.headers()).await;
            return Transport::read_json(response).await;
        }

        if status == StatusCode::UNAUTHORIZED && !is_auth {
            return Err(self.handle_unauthorized(auth_handled).await);
        }

        Err(Transport::error_from_response(response).await)
    }

    async fn handle_unauthorized(&self, auth_handled: &AtomicBool) -> ApiError {
        if self.tokens.is_session_pending() {
            warn!("401 while session is being established or refreshed; keeping tokens");
            return ApiError::AuthExpired;
        }
        if auth_handled.swap(true, Ordering::SeqCst) {
            return ApiError::AuthExpired;
        }
        self.expire_session().await;
        ApiError::AuthExpired
    }

    /// Cached CSRF pair, or one fetched with the current access token.
    /// Never fails the call.
    async fn csrf_material(&self, access_token: Option<&str>) -> Option<CsrfMaterial> {
        match self.csrf.load().await {
            Ok(Some(material)) => return Some(material),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to read csrf material"),
        }

        let token = access_token?;
        match self.auth_api.fetch_csrf(token).await {
            Ok(Some(material)) => {
                if let Err(err) = self.csrf.save(&material).await {
                    warn!(error = %err, "failed to persist fetched csrf material");
                }
                Some(material)
            }
            Ok(None) => {
                debug!("csrf endpoint returned no material");
                None
            }
            Err(err) => {
                debug!(error = %err, "csrf fetch failed; sending without it");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_safe_methods_retry_by_default() {
        assert!(ApiRequest::get("/accounts").retry_safe);
        assert!(!ApiRequest::post("/transfers").retry_safe);
        assert!(!ApiRequest::delete("/cards/1").retry_safe);
        assert!(ApiRequest::post("/transfers").retry_safe(true).retry_safe);
    }

    #[test]
    fn test_mutating_methods() {
        assert!(!ApiRequest::get("/a").is_mutating());
        assert!(ApiRequest::post("/a").is_mutating());
        assert!(ApiRequest::put("/a").is_mutating());
        assert!(ApiRequest::patch("/a").is_mutating());
        assert!(ApiRequest::delete("/a").is_mutating());
    }

    #[test]
    fn test_with_json_serializes_body() {
        #[derive(Serialize)]
        struct Transfer {
            amount: u32,
        }
        let request = ApiRequest::post("/transfers")
            .with_json(&Transfer { amount: 10 })
            .unwrap();
        assert_eq!(request.body, Some(serde_json::json!({"amount": 10})));
    }
}
