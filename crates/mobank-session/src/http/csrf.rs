/*
[INPUT]:  Secure store, response headers carrying CSRF material
[OUTPUT]: Cached CSRF token/secret pair and request header injection
[POS]:    HTTP layer - anti-forgery material for state-mutating requests
[UPDATE]: When CSRF header names or storage layout change
*/

use std::sync::Arc;

use reqwest::header::HeaderMap;
use reqwest::RequestBuilder;
use tracing::{debug, warn};

use crate::http::Result;
use crate::store::{keys, SecureStore};
use crate::types::CsrfMaterial;

pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";
pub const CSRF_SECRET_HEADER: &str = "x-csrf-secret";

/// Store-backed CSRF cache. Reads go to the store so a cleared session is
/// never served stale material.
#[derive(Debug, Clone)]
pub struct CsrfCache {
    store: Arc<dyn SecureStore>,
}

impl CsrfCache {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self { store }
    }

    /// Both halves, or nothing.
    pub async fn load(&self) -> Result<Option<CsrfMaterial>> {
        let values = self
            .store
            .multi_get(&[keys::CSRF_TOKEN, keys::CSRF_SECRET])
            .await?;
        let mut values = values.into_iter();
        let token = values.next().flatten();
        let secret = values.next().flatten();
        Ok(CsrfMaterial::from_parts(token, secret))
    }

    pub async fn save(&self, material: &CsrfMaterial) -> Result<()> {
        self.store
            .multi_set(&[
                (keys::CSRF_TOKEN, material.token.clone()),
                (keys::CSRF_SECRET, material.secret.clone()),
            ])
            .await?;
        Ok(())
    }

    /// CSRF pair from response headers, if the server sent both.
    pub fn from_headers(headers: &HeaderMap) -> Option<CsrfMaterial> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        CsrfMaterial::from_parts(read(CSRF_TOKEN_HEADER), read(CSRF_SECRET_HEADER))
    }

    /// Persist material found in `headers`, replacing the cached pair.
    ///
    /// Storage failures are logged; harvesting never fails the call it rides on.
    pub async fn harvest(&self, headers: &HeaderMap) -> bool {
        let Some(material) = Self::from_headers(headers) else {
            return false;
        };
        match self.save(&material).await {
            Ok(()) => {
                debug!("csrf material refreshed from response");
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to persist csrf material");
                false
            }
        }
    }

    pub fn apply(builder: RequestBuilder, material: &CsrfMaterial) -> RequestBuilder {
        builder
            .header(CSRF_TOKEN_HEADER, material.token.as_str())
            .header(CSRF_SECRET_HEADER, material.secret.as_str())
    }
}
