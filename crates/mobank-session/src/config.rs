/*
[INPUT]:  YAML configuration file or layered config sources
[OUTPUT]: Typed session configuration with defaults for every field
[POS]:    Configuration layer - API, retry, PIN, activity and session policy
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the session core
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub pin: PinPolicyConfig,
    pub activity: ActivityConfig,
    pub session: SessionPolicyConfig,
}

/// Remote API location and timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub endpoints: EndpointConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            endpoints: EndpointConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Paths of the authentication endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub login: String,
    pub register: String,
    pub refresh: String,
    pub logout: String,
    pub csrf: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            register: "/auth/register".to_string(),
            refresh: "/auth/refresh".to_string(),
            logout: "/auth/logout".to_string(),
            csrf: "/auth/csrf-token".to_string(),
        }
    }
}

impl EndpointConfig {
    /// Endpoints that establish a session and must not carry a bearer token.
    pub fn is_auth_endpoint(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path).trim_start_matches('/');
        [&self.login, &self.register, &self.refresh]
            .iter()
            .any(|endpoint| path == endpoint.trim_start_matches('/'))
    }
}

/// Backoff parameters for retriable failures
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: u32,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1_000,
            multiplier: 2,
            max_delay_ms: 30_000,
            jitter: false,
        }
    }
}

/// PIN attempt limits and hashing cost
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PinPolicyConfig {
    pub max_attempts: u32,
    pub lockout_window_ms: u64,
    pub default_inactivity_timeout_ms: u64,
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
    pub hash_parallelism: u32,
}

impl Default for PinPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_window_ms: 5 * 60 * 1_000,
            default_inactivity_timeout_ms: 5 * 60 * 1_000,
            hash_memory_kib: 16_384,
            hash_iterations: 2,
            hash_parallelism: 1,
        }
    }
}

impl PinPolicyConfig {
    pub fn lockout_window(&self) -> Duration {
        Duration::from_millis(self.lockout_window_ms)
    }

    pub fn default_inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.default_inactivity_timeout_ms)
    }
}

/// Auto-lock behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub lock_on_background: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            lock_on_background: true,
        }
    }
}

/// Token expiry handling
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionPolicyConfig {
    /// Treat access tokens as expired this long before their stated expiry.
    pub expiry_leeway_ms: u64,
    /// Also call the logout endpoint when a 401 ends the session.
    pub server_logout_on_expiry: bool,
}

impl Default for SessionPolicyConfig {
    fn default() -> Self {
        Self {
            expiry_leeway_ms: 30_000,
            server_logout_on_expiry: false,
        }
    }
}

impl SessionPolicyConfig {
    pub fn expiry_leeway(&self) -> Duration {
        Duration::from_millis(self.expiry_leeway_ms)
    }
}

impl SessionConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path).map_err(|e| format!("read {path}: {e}"))?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| format!("parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the components cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.api.base_url.trim().is_empty() {
            return Err("api.base_url cannot be empty".to_string());
        }
        if self.api.timeout_ms == 0 || self.api.connect_timeout_ms == 0 {
            return Err("api timeouts must be greater than zero".to_string());
        }
        if self.retry.multiplier == 0 {
            return Err("retry.multiplier must be at least 1".to_string());
        }
        if self.pin.max_attempts == 0 {
            return Err("pin.max_attempts must be at least 1".to_string());
        }
        if self.pin.hash_iterations == 0 || self.pin.hash_parallelism == 0 {
            return Err("pin hash iterations and parallelism must be at least 1".to_string());
        }
        if self.pin.hash_memory_kib < 8 * self.pin.hash_parallelism {
            return Err("pin.hash_memory_kib must be at least 8 * hash_parallelism".to_string());
        }
        Ok(())
    }
}
