/*
[INPUT]:  Transport, refresh/access tokens
[OUTPUT]: Refreshed token grants, CSRF material, server-side logout
[POS]:    HTTP layer - raw auth side-channel calls that bypass the pipeline
[UPDATE]: When refresh, logout or CSRF endpoint contracts change
*/

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::auth::jwt::{TokenGrant, TokenResponse};
use crate::auth::TokenRefresher;
use crate::clock::{Clock, SystemClock};
use crate::http::csrf::CsrfCache;
use crate::http::{ApiError, Result, Transport};
use crate::types::CsrfMaterial;

/// Body form of the CSRF endpoint, for servers that do not echo headers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsrfBody {
    #[serde(alias = "token", alias = "csrf_token")]
    csrf_token: Option<String>,
    #[serde(alias = "secret", alias = "csrf_secret")]
    csrf_secret: Option<String>,
}

/// Auth calls made directly on the transport.
///
/// These never go through the request pipeline: they must not trigger token
/// injection, refresh or 401 session handling themselves.
#[derive(Debug, Clone)]
pub struct AuthApi {
    transport: Transport,
    clock: Arc<dyn Clock>,
}

impl AuthApi {
    pub fn new(transport: Transport) -> Self {
        Self::with_clock(transport, Arc::new(SystemClock))
    }

    pub fn with_clock(transport: Transport, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    /// Exchange a refresh token for new credentials
    ///
    /// POST {refresh} body: {"refreshToken": ...}
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.transport.ensure_online()?;
        let endpoint = self.transport.endpoints().refresh.clone();
        let builder = self
            .transport
            .request(Method::POST, &endpoint)?
            .json(&serde_json::json!({ "refreshToken": refresh_token }));

        let response: Option<TokenResponse> = self.transport.send_json(builder).await?;
        let response = response
            .ok_or_else(|| ApiError::InvalidResponse("refresh returned an empty body".into()))?;
        Ok(response.into_grant(self.clock.now()))
    }

    /// Best-effort server-side logout
    ///
    /// POST {logout} with the current bearer token
    pub async fn logout(&self, access_token: &str) -> Result<()> {
        self.transport.ensure_online()?;
        let endpoint = self.transport.endpoints().logout.clone();
        let builder = self
            .transport
            .request(Method::POST, &endpoint)?
            .bearer_auth(access_token);
        self.transport.execute(builder).await?;
        debug!("server-side logout acknowledged");
        Ok(())
    }

    /// Fetch CSRF material with an authenticated GET
    ///
    /// GET {csrf}; headers win over body fields.
    pub async fn fetch_csrf(&self, access_token: &str) -> Result<Option<CsrfMaterial>> {
        self.transport.ensure_online()?;
        let endpoint = self.transport.endpoints().csrf.clone();
        let builder = self
            .transport
            .request(Method::GET, &endpoint)?
            .bearer_auth(access_token);
        let response = self.transport.execute(builder).await?;

        if let Some(material) = CsrfCache::from_headers(response.headers()) {
            return Ok(Some(material));
        }

        let body: Option<CsrfBody> = Transport::read_json(response).await.unwrap_or(None);
        Ok(body.and_then(|body| CsrfMaterial::from_parts(body.csrf_token, body.csrf_secret)))
    }
}

/// `TokenRefresher` backed by the refresh endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    api: AuthApi,
}

impl HttpTokenRefresher {
    pub fn new(api: AuthApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.api.refresh(refresh_token).await
    }
}
