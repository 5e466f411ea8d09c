/*
[INPUT]:  Token endpoint responses, secure store, request pipeline
[OUTPUT]: Valid access tokens, session lifecycle events, login/logout
[POS]:    Auth layer - token lifecycle and session management
[UPDATE]: When token lifecycle or session flow changes
*/

pub mod jwt;
pub mod manager;
pub mod token;

pub use jwt::{decode_expiry, TokenGrant, TokenResponse};
pub use manager::{LoginCredentials, RegisterRequest, SessionManager};
pub use token::{EstablishingGuard, TokenManager, TokenRefresher};
