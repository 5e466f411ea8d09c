/*
[INPUT]:  API configuration, connectivity, token manager
[OUTPUT]: HTTP responses, typed API results and the failure taxonomy
[POS]:    HTTP layer - request pipeline and auth side-channel calls
[UPDATE]: When adding pipeline stages or changing transport behavior
*/

pub mod auth_api;
pub mod client;
pub mod connectivity;
pub mod csrf;
pub mod error;
pub mod retry;
pub mod transport;

pub use error::{ApiError, ErrorKind, Result};
pub use retry::{request_with_retry, RetryPolicy};

pub use auth_api::{AuthApi, HttpTokenRefresher};
pub use client::{ApiClient, ApiRequest};
pub use connectivity::{Connectivity, SharedConnectivity};
pub use csrf::CsrfCache;
pub use transport::Transport;
