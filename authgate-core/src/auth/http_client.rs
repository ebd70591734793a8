//! HTTP gateway for the auth service
//!
//! Every outbound call goes through [`HttpGateway::send`], which attaches the
//! bearer token from the credential store and runs the unauthorized-recovery
//! protocol when the service answers 401.

use super::state::SessionState;
use super::storage::{CookieTier, CredentialStore};
use super::types::AuthError;
use crate::navigation::Navigator;
use crate::settings::AuthSettings;
use crate::utils::with_retry_if;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

pub const REGISTER_PATH: &str = "/auth-service/api/v1/auth/register";
pub const LOGIN_PATH: &str = "/auth-service/api/v1/auth/login";
pub const SIGNUP_PATH: &str = "/auth-service/api/v1/auth/signup";
pub const ME_PATH: &str = "/auth-service/api/v1/auth/me";
pub const GOOGLE_OAUTH_URL_PATH: &str = "/auth-service/api/v1/oauth2/google/url";

const EVENT_CAPACITY: usize = 64;

/// An outbound call.
///
/// Clones share one recovery guard, so a re-submitted request can never run
/// the recovery protocol a second time.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    recovery_fired: Arc<AtomicBool>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            recovery_fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, AuthError> {
        let value = serde_json::to_value(body)
            .map_err(|e| AuthError::DecodeError(format!("Failed to serialize request: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Whether the recovery protocol already ran for this request chain
    pub fn recovery_fired(&self) -> bool {
        self.recovery_fired.load(Ordering::SeqCst)
    }

    /// Claim the recovery guard. Only the first caller gets `true`.
    fn claim_recovery(&self) -> bool {
        !self.recovery_fired.swap(true, Ordering::SeqCst)
    }
}

/// Raw response from the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the JSON body
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, AuthError> {
        serde_json::from_str(&self.body)
            .map_err(|e| AuthError::DecodeError(format!("Failed to parse response: {}", e)))
    }
}

/// Advisory events for logging/telemetry
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Dispatched {
        method: String,
        path: String,
        authenticated: bool,
        at: DateTime<Utc>,
    },
    UnauthorizedRecovery {
        path: String,
        at: DateTime<Utc>,
    },
}

/// Moves a request over the wire
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `request`. Only transport failures are errors; any HTTP status
    /// comes back as a response.
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, AuthError>;
}

/// `reqwest` transport with the cookie tier as its cookie provider
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(settings: &AuthSettings, cookies: Arc<CookieTier>) -> Result<Self, AuthError> {
        let base_url = settings.base_url()?;
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .cookie_provider(cookies)
            .build()
            .map_err(|e| AuthError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn url_for(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url
            .join(path)
            .map_err(|e| AuthError::NetworkError(format!("Invalid request path {}: {}", path, e)))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, AuthError> {
        let url = self.url_for(&request.path)?;

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header("Content-Type", "application/json");
        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::NetworkError(format!("Failed to read response: {}", e)))?;

        Ok(ApiResponse { status, body })
    }
}

/// The request interceptor pair: bearer attachment on the way out, 401
/// recovery on the way back.
pub struct HttpGateway {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    state: Arc<SessionState>,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    network_attempts: u32,
    events: broadcast::Sender<GatewayEvent>,
}

impl HttpGateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        state: Arc<SessionState>,
        navigator: Arc<dyn Navigator>,
        settings: &AuthSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            store,
            state,
            navigator,
            login_route: settings.login_route.clone(),
            network_attempts: settings.network_retry_attempts.max(1),
            events,
        }
    }

    /// Subscribe to dispatch/recovery events
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    fn emit(&self, event: GatewayEvent) {
        // No subscribers is fine: events are advisory.
        let _ = self.events.send(event);
    }

    /// Send `request`, attaching the bearer token when one is stored.
    ///
    /// Non-2xx statuses come back as errors: 401 as `Unauthorized` (after
    /// recovery ran), anything else as `ApiError` with status and body intact.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        let response = with_retry_if(
            self.network_attempts,
            |e: &AuthError| matches!(e, AuthError::NetworkError(_)),
            || self.dispatch(request),
        )
        .await?;

        if response.is_success() {
            return Ok(response);
        }

        if response.status == StatusCode::UNAUTHORIZED.as_u16() {
            warn!("{} {} -> 401 Unauthorized", request.method, request.path);
            self.recover(request);
            return Err(AuthError::Unauthorized(response.body));
        }

        error!(
            "API error: {} {} -> {} {}",
            request.method, request.path, response.status, response.body
        );
        Err(AuthError::ApiError {
            status: response.status,
            body: response.body,
        })
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        let token = self.store.access_token();
        if token.is_some() {
            debug!("Added token to request: {}", request.path);
        }
        self.emit(GatewayEvent::Dispatched {
            method: request.method.to_string(),
            path: request.path.clone(),
            authenticated: token.is_some(),
            at: Utc::now(),
        });
        self.transport.execute(request, token.as_deref()).await
    }

    /// Unauthorized-recovery protocol, at most once per request chain
    fn recover(&self, request: &ApiRequest) {
        if !request.claim_recovery() {
            debug!("Recovery already ran for {}, skipping", request.path);
            return;
        }

        info!("Unauthorized response, ending session and redirecting to login");
        end_session(&self.store, &self.state, self.navigator.as_ref(), &self.login_route);
        self.emit(GatewayEvent::UnauthorizedRecovery {
            path: request.path.clone(),
            at: Utc::now(),
        });
    }
}

/// Clear cached session data, flip to `Unauthenticated`, navigate to login.
///
/// Shared by logout and the recovery protocol. Storage failures are logged and
/// do not stop the state transition.
pub(crate) fn end_session(
    store: &CredentialStore,
    state: &SessionState,
    navigator: &dyn Navigator,
    login_route: &str,
) {
    if let Err(e) = store.clear_all() {
        warn!("Failed to clear stored session: {}", e);
    }
    state.invalidate();
    navigator.navigate(login_route);
}
