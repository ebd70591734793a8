//! Authentication types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Authentication state
///
/// `Initializing` is the only start state. It resolves to one of the other two
/// before anything makes an access-control decision.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AuthState {
    /// Startup hydration has not finished yet
    #[default]
    Initializing,
    /// Logged in with a known profile
    Authenticated(UserProfile),
    /// No session
    Unauthenticated,
}

impl AuthState {
    /// Whether hydration has produced a decision
    pub fn is_resolved(&self) -> bool {
        !matches!(self, AuthState::Initializing)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    /// The current profile if logged in
    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            AuthState::Authenticated(profile) => Some(profile),
            _ => None,
        }
    }

    /// Short label for log lines
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Initializing => "Initializing",
            AuthState::Authenticated(_) => "Authenticated",
            AuthState::Unauthenticated => "Unauthenticated",
        }
    }
}

/// User profile as served by `GET /auth/me`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<BTreeSet<String>>,
}

impl UserProfile {
    /// Name suitable for a greeting.
    ///
    /// Form-encoded names sometimes leak through the server unescaped, so any
    /// remaining `+` is shown as a space.
    pub fn display_name(&self) -> String {
        self.name.replace('+', " ")
    }
}

/// Access/refresh token pair
///
/// Tokens are opaque. Validity is decided only by the remote service.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &format_args!("<{} chars>", self.access_token.len()))
            .field("refresh_token", &format_args!("<{} chars>", self.refresh_token.len()))
            .finish()
    }
}

/// Token grant optionally returned in the body of login/signup responses.
///
/// The service normally sets cookies instead, so both fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/signup`
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Coarse classification of an [`AuthError`], for exhaustive branching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoSession,
    Unauthorized,
    Network,
    Decode,
    Validation,
    Unknown,
}

/// Error types for authentication
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("No session found")]
    NoSession,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::NoSession => ErrorKind::NoSession,
            AuthError::Unauthorized(_) => ErrorKind::Unauthorized,
            AuthError::NetworkError(_) => ErrorKind::Network,
            AuthError::DecodeError(_) => ErrorKind::Decode,
            AuthError::ValidationError(_) => ErrorKind::Validation,
            AuthError::StorageError(_) | AuthError::ApiError { .. } => ErrorKind::Unknown,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    /// Message from an API error body (`{"message": "..."}`), if there is one
    pub fn server_message(&self) -> Option<String> {
        match self {
            AuthError::ApiError { body, .. } | AuthError::Unauthorized(body) => {
                serde_json::from_str::<serde_json::Value>(body)
                    .ok()?
                    .get("message")?
                    .as_str()
                    .map(str::to_string)
            }
            _ => None,
        }
    }
}
