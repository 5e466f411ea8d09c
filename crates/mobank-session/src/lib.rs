/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public session & device-security core surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod activity;
pub mod auth;
pub mod clock;
pub mod config;
pub mod events;
pub mod http;
pub mod security;
pub mod store;
pub mod types;

// Re-export commonly used types from auth
pub use auth::{LoginCredentials, RegisterRequest, SessionManager, TokenManager, TokenRefresher};

// Re-export commonly used types from http
pub use http::{
    request_with_retry,
    ApiClient,
    ApiError,
    ApiRequest,
    Connectivity,
    ErrorKind,
    HttpTokenRefresher,
    Result,
    RetryPolicy,
    SharedConnectivity,
    Transport,
};

// Re-export commonly used types from security
pub use security::{
    BiometricAuthenticator,
    BiometricCapability,
    MockBiometricAuthenticator,
    PinSecurityController,
    PinSetupFlow,
    PinVerification,
    SecurityError,
};

// Re-export commonly used types from activity
pub use activity::{ActivityMonitor, AutoLock};

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use events::{ListenerId, ListenerRegistry};
pub use store::{JsonFileStore, MemoryStore, SecureStore, StoreError};

// Re-export all types
pub use types::*;
