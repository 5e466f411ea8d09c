/*
[INPUT]:  API configuration (base URL, timeouts, endpoints), connectivity collaborator
[OUTPUT]: Configured reqwest client, request builders and response classification
[POS]:    HTTP layer - shared transport used by the pipeline and auth calls
[UPDATE]: When adding connection options or changing response parsing
*/

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::config::{ApiConfig, EndpointConfig};
use crate::http::{ApiError, Connectivity, Result, SharedConnectivity};

/// Thin wrapper over a reqwest client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct Transport {
    http_client: Client,
    base_url: Url,
    endpoints: EndpointConfig,
    connectivity: Arc<dyn Connectivity>,
}

impl Transport {
    /// Create a transport that always reports online.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Self::with_connectivity(config, Arc::new(SharedConnectivity::default()))
    }

    pub fn with_connectivity(config: &ApiConfig, connectivity: Arc<dyn Connectivity>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(&config.base_url)?,
            endpoints: config.endpoints.clone(),
            connectivity,
        })
    }

    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Fail fast when the device is offline.
    pub fn ensure_online(&self) -> Result<()> {
        if self.connectivity.is_online() {
            Ok(())
        } else {
            Err(ApiError::NetworkUnavailable)
        }
    }

    /// Build full URL for an endpoint, keeping any path prefix of the base URL
    pub fn url(&self, endpoint: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let endpoint = endpoint.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{endpoint}"))?)
    }

    /// Build request builder for an endpoint
    pub fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.url(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Send the request and turn non-success statuses into `ApiError`.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        trace!(%status, url = %response.url(), "response received");
        if status.is_success() {
            Ok(response)
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    /// Classify a failed response, keeping the server-provided message when present.
    pub async fn error_from_response(response: Response) -> ApiError {
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        let message = extract_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

        match ApiError::api_error(status, message) {
            ApiError::RateLimited { .. } => ApiError::RateLimited { retry_after },
            other => other,
        }
    }

    /// Decode a JSON body; an empty body decodes as `null`.
    pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.execute(builder).await?;
        Self::read_json(response).await
    }
}

/// `message`, `error` or `detail` field of a JSON error body, else the raw text.
fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for field in ["message", "error", "detail"] {
            if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                return Some(text.to_string());
            }
        }
    }
    Some(trimmed.chars().take(512).collect())
}

/// Delta-seconds form only.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            ..ApiConfig::default()
        }
    }

    #[test]
    fn test_url_keeps_base_path() {
        let transport = Transport::new(&config("https://bank.example/api/v1/")).unwrap();
        assert_eq!(
            transport.url("/accounts").unwrap().as_str(),
            "https://bank.example/api/v1/accounts"
        );
    }

    #[test]
    fn test_extract_message_prefers_json_fields() {
        assert_eq!(
            extract_message(r#"{"message":"Invalid account"}"#).as_deref(),
            Some("Invalid account")
        );
        assert_eq!(
            extract_message(r#"{"detail":"nope"}"#).as_deref(),
            Some("nope")
        );
        assert_eq!(extract_message("plain failure").as_deref(), Some("plain failure"));
        assert_eq!(extract_message("  "), None);
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_offline_fails_fast() {
        let connectivity = SharedConnectivity::new(false);
        let transport =
            Transport::with_connectivity(&config("http://localhost"), Arc::new(connectivity)).unwrap();
        assert_eq!(transport.ensure_online(), Err(ApiError::NetworkUnavailable));
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let transport = Transport::new(&config(&server.uri())).unwrap();
        let builder = transport.request(Method::GET, "/busy").unwrap();
        let err = transport.execute(builder).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
    }

    #[tokio::test]
    async fn test_client_error_message_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transfers"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(serde_json::json!({"message": "Insufficient funds"})),
            )
            .mount(&server)
            .await;

        let transport = Transport::new(&config(&server.uri())).unwrap();
        let builder = transport.request(Method::POST, "/transfers").unwrap();
        let err = transport.send_json::<serde_json::Value>(builder).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Client {
                status: 422,
                message: "Insufficient funds".into()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_body_reads_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/cards/1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let transport = Transport::new(&config(&server.uri())).unwrap();
        let builder = transport.request(Method::DELETE, "/cards/1").unwrap();
        let value: Option<serde_json::Value> = transport.send_json(builder).await.unwrap();
        assert!(value.is_none());
    }
}
