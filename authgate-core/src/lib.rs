//! AuthGate Core Library
//!
//! Client-side session and authorization layer for applications backed by a
//! remote auth service: credential caching, authenticated requests, and a
//! session state machine that reacts consistently to 401 responses.

pub mod auth;
pub mod client;
pub mod locale;
pub mod navigation;
pub mod settings;
pub mod utils;

// Re-export commonly used items
pub use auth::{
    AuthActions, AuthError, AuthState, CredentialStore, ErrorKind, HttpGateway, RoleGate,
    SessionController, UserProfile,
};
pub use client::AuthGate;
pub use locale::{Locale, LocaleContext};
pub use navigation::{LoggingNavigator, Navigator, RecordingNavigator, LOGIN_ROUTE};
pub use settings::{load_settings, AuthSettings};
pub use utils::rotate_log_if_needed;
