//! Login, signup, registration and OAuth entry points

use super::http_client::{
    ApiRequest, ApiResponse, GOOGLE_OAUTH_URL_PATH, LOGIN_PATH, REGISTER_PATH, SIGNUP_PATH,
};
use super::manager::SessionController;
use super::storage::CredentialKey;
use super::types::{
    AuthError, LoginRequest, RegisterRequest, SessionTokens, SignupRequest, TokenGrant, UserProfile,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use url::Url;

/// Minimum number of satisfied password rules for registration
const MIN_PASSWORD_RULES: usize = 4;

/// Which password rules a candidate satisfies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordStrength {
    pub length: bool,
    pub uppercase: bool,
    pub lowercase: bool,
    pub number: bool,
    pub special: bool,
}

impl PasswordStrength {
    pub fn evaluate(password: &str) -> Self {
        Self {
            length: password.chars().count() >= 8,
            uppercase: password.chars().any(|c| c.is_ascii_uppercase()),
            lowercase: password.chars().any(|c| c.is_ascii_lowercase()),
            number: password.chars().any(|c| c.is_ascii_digit()),
            special: password.chars().any(|c| !c.is_ascii_alphanumeric()),
        }
    }

    pub fn satisfied(&self) -> usize {
        [
            self.length,
            self.uppercase,
            self.lowercase,
            self.number,
            self.special,
        ]
        .iter()
        .filter(|ok| **ok)
        .count()
    }

    pub fn is_strong(&self) -> bool {
        self.satisfied() >= MIN_PASSWORD_RULES
    }
}

/// Higher-level auth operations. Each one talks to the service through the
/// gateway, then lets the controller refresh local state.
pub struct AuthActions {
    controller: Arc<SessionController>,
}

impl AuthActions {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    /// Sign in with email and password
    pub async fn login(&self, credentials: &LoginRequest) -> Result<UserProfile, AuthError> {
        info!("Signing in user: {}", credentials.email);
        let request = ApiRequest::post(LOGIN_PATH).json(credentials)?;
        self.establish(request, "Login").await
    }

    /// Create an account through the login-flow signup endpoint
    pub async fn signup(&self, details: &SignupRequest) -> Result<UserProfile, AuthError> {
        info!("Signing up user: {}", details.email);
        let request = ApiRequest::post(SIGNUP_PATH).json(details)?;
        self.establish(request, "Signup").await
    }

    /// Create an account through the registration endpoint.
    ///
    /// Weak passwords are rejected locally before any request is made.
    pub async fn register(&self, details: &RegisterRequest) -> Result<UserProfile, AuthError> {
        let strength = PasswordStrength::evaluate(&details.password);
        if !strength.is_strong() {
            warn!(
                "Rejecting registration: password meets {}/5 rules",
                strength.satisfied()
            );
            return Err(AuthError::ValidationError(format!(
                "Password too weak: needs at least {} of length 8+, uppercase, lowercase, digit, special character",
                MIN_PASSWORD_RULES
            )));
        }

        info!("Registering user: {}", details.email);
        let request = ApiRequest::post(REGISTER_PATH).json(details)?;
        self.establish(request, "Registration").await
    }

    async fn establish(&self, request: ApiRequest, what: &str) -> Result<UserProfile, AuthError> {
        let response = match self.controller.gateway().send(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!("{} failed: {}", what, e);
                return Err(e);
            }
        };

        self.store_token_grant(&response)?;
        info!("{} successful, fetching user data", what);
        self.controller.fetch_user_data().await
    }

    /// Keep tokens returned in the body. Cookie-only responses carry none.
    fn store_token_grant(&self, response: &ApiResponse) -> Result<(), AuthError> {
        let grant = match serde_json::from_str::<TokenGrant>(&response.body) {
            Ok(grant) => grant,
            Err(_) => {
                debug!("Response body carries no token grant");
                return Ok(());
            }
        };

        let store = self.controller.store();
        match (grant.access_token, grant.refresh_token) {
            (Some(access_token), Some(refresh_token)) => store.store_tokens(&SessionTokens {
                access_token,
                refresh_token,
            }),
            (Some(access_token), None) => {
                store.write(CredentialKey::AccessToken, &access_token)?;
                // A refresh token from an earlier session does not pair with this one
                store.clear(CredentialKey::RefreshToken)
            }
            (None, Some(_)) => {
                warn!("Response carried a refresh token without an access token, ignoring it");
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    /// Ask the service for the Google authorization URL.
    ///
    /// The caller navigates there. State changes happen after the provider
    /// redirects back, through [`complete_oauth_redirect`](Self::complete_oauth_redirect).
    pub async fn begin_oauth_redirect(&self) -> Result<Url, AuthError> {
        let response = match self
            .controller
            .gateway()
            .send(&ApiRequest::get(GOOGLE_OAUTH_URL_PATH))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to get Google auth URL: {}", e);
                return Err(e);
            }
        };

        let raw = match serde_json::from_str::<String>(&response.body) {
            Ok(url) => url,
            Err(_) => response.body.trim().to_string(),
        };

        let url = Url::parse(&raw)
            .map_err(|e| AuthError::DecodeError(format!("Invalid authorization URL: {}", e)))?;
        info!("Got authorization URL for {}", url.host_str().unwrap_or("<no host>"));
        Ok(url)
    }

    /// Finish an OAuth round-trip once the service has set session cookies
    pub async fn complete_oauth_redirect(&self) -> bool {
        self.controller.set_tokens().await
    }
}
