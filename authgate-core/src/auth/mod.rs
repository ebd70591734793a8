//! Authentication module for AuthGate
//!
//! Handles the client side of the auth service:
//! - Dual-tier credential storage (cookie jar + local storage)
//! - Bearer attachment and 401 recovery for every request
//! - Session state machine with cache-first startup hydration
//! - Login, signup, registration and Google OAuth entry points

mod actions;
mod http_client;
mod manager;
mod roles;
mod state;
mod storage;
pub mod types;

pub use actions::{AuthActions, PasswordStrength};
pub use http_client::{
    ApiRequest, ApiResponse, GatewayEvent, HttpGateway, ReqwestTransport, Transport,
    GOOGLE_OAUTH_URL_PATH, LOGIN_PATH, ME_PATH, REGISTER_PATH, SIGNUP_PATH,
};
pub use manager::SessionController;
pub use roles::RoleGate;
pub use state::SessionState;
pub use storage::{
    decode_cookie_value, encode_cookie_value, CookieTier, CredentialKey, CredentialStore,
    LocalStorageTier, StorageTier, LOCALE_KEY,
};
pub use types::*;
