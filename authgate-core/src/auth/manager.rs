//! Session controller - startup hydration, profile refresh and logout

use super::http_client::{end_session, ApiRequest, HttpGateway, ME_PATH};
use super::roles::RoleGate;
use super::state::SessionState;
use super::storage::CredentialStore;
use super::types::{AuthError, AuthState, UserProfile};
use crate::navigation::Navigator;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};

/// Result of the most recent profile fetch, shared with callers that waited on it
#[derive(Default)]
struct FetchSlot {
    last: Option<Result<UserProfile, AuthError>>,
}

/// Counts one running fetch for as long as it lives, including when the
/// caller drops the future early.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the session state machine.
///
/// `Initializing` resolves once through [`SessionController::hydrate`]; after
/// that, login/logout and the gateway's recovery protocol move the state.
pub struct SessionController {
    gateway: Arc<HttpGateway>,
    store: CredentialStore,
    state: Arc<SessionState>,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    fetch_slot: AsyncMutex<FetchSlot>,
    fetches_completed: AtomicU64,
    fetches_in_flight: AtomicUsize,
}

impl SessionController {
    pub fn new(
        gateway: Arc<HttpGateway>,
        state: Arc<SessionState>,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Self {
        let store = gateway.store().clone();
        Self {
            gateway,
            store,
            state,
            navigator,
            login_route: login_route.into(),
            fetch_slot: AsyncMutex::new(FetchSlot::default()),
            fetches_completed: AtomicU64::new(0),
            fetches_in_flight: AtomicUsize::new(0),
        }
    }

    /// Get the current auth state
    pub fn state(&self) -> AuthState {
        self.state.current()
    }

    /// Watch every state transition
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Wait for hydration to decide
    pub async fn wait_until_resolved(&self) -> AuthState {
        self.state.wait_until_resolved().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.current().is_authenticated()
    }

    /// True while the state is unresolved or a profile fetch is running
    pub fn is_loading(&self) -> bool {
        !self.state.current().is_resolved() || self.fetches_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Get the current user profile if logged in
    pub fn user(&self) -> Option<UserProfile> {
        self.state.current().profile().cloned()
    }

    pub fn has_role(&self, role: &str) -> bool {
        RoleGate::has_role(&self.state.current(), role)
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<HttpGateway> {
        &self.gateway
    }

    /// Resolve `Initializing` from caches first, network last.
    ///
    /// Order: profile cookie, local profile record, remote fetch when a token
    /// exists. A cached profile is trusted as-is; call
    /// [`fetch_user_data`](Self::fetch_user_data) to pick up server changes.
    /// Runs only while `Initializing`; later calls return the current state.
    pub async fn hydrate(&self) -> Result<AuthState, AuthError> {
        let current = self.state.current();
        if current.is_resolved() {
            debug!("Hydration already done ({})", current.label());
            return Ok(current);
        }

        info!("Initializing auth...");

        if let Some(profile) = self.store.profile_from_transmitted() {
            info!("User data loaded from cookie: {}", profile.email);
            self.state.authenticate(profile);
            return Ok(self.state.current());
        }

        if let Some(profile) = self.store.profile_from_local() {
            info!("User data loaded from local storage: {}", profile.email);
            self.state.authenticate(profile);
            return Ok(self.state.current());
        }

        if self.store.access_token().is_none() {
            info!("No token found");
            self.state.resolve_unauthenticated();
            return Ok(self.state.current());
        }

        info!("Token found, fetching user data");
        match self.fetch_user_data().await {
            Ok(_) => Ok(self.state.current()),
            Err(e) => {
                error!("Failed to initialize auth: {}", e);
                self.state.resolve_unauthenticated();
                Err(e)
            }
        }
    }

    /// Fetch the profile from the service, bypassing every cache.
    ///
    /// Success persists the profile to both tiers before the state becomes
    /// `Authenticated`. A 401 has already ended the session by the time this
    /// returns. Any other failure leaves the state untouched. If the session
    /// ends while the request is running, the result is dropped and the call
    /// fails with `NoSession`.
    ///
    /// Concurrent callers share one request: whoever arrives while a fetch is
    /// running gets that fetch's result.
    pub async fn fetch_user_data(&self) -> Result<UserProfile, AuthError> {
        let seen = self.fetches_completed.load(Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.fetches_in_flight);
        self.fetch_coalesced(seen).await
    }

    async fn fetch_coalesced(&self, seen: u64) -> Result<UserProfile, AuthError> {
        let mut slot = self.fetch_slot.lock().await;

        if self.fetches_completed.load(Ordering::SeqCst) != seen {
            if let Some(last) = &slot.last {
                debug!("Joined an in-flight profile fetch");
                return last.clone();
            }
        }

        let result = self.fetch_and_apply().await;
        slot.last = Some(result.clone());
        self.fetches_completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn fetch_and_apply(&self) -> Result<UserProfile, AuthError> {
        info!("Fetching user data...");
        let epoch = self.state.epoch();

        let response = match self.gateway.send(&ApiRequest::get(ME_PATH)).await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to fetch user data: {}", e);
                return Err(e);
            }
        };

        let profile: UserProfile = response.json()?;

        if self.state.epoch() != epoch {
            warn!("Session ended while the profile fetch was running, discarding result");
            return Err(AuthError::NoSession);
        }

        self.store.write_profile(&profile)?;
        self.state.authenticate(profile.clone());
        Ok(profile)
    }

    /// Fetch the profile after the server established a session through
    /// cookies (OAuth callback). Returns whether a session now exists.
    pub async fn set_tokens(&self) -> bool {
        match self.fetch_user_data().await {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to set tokens: {}", e);
                false
            }
        }
    }

    /// Log out and clear stored credentials. Safe to call repeatedly.
    pub fn logout(&self) {
        info!("Logging out");
        end_session(&self.store, &self.state, self.navigator.as_ref(), &self.login_route);
        info!("Logged out successfully");
    }

    /// Guard for protected views: wait for hydration, then send the user to the
    /// login route if there is no session. Returns the profile when there is one.
    pub async fn require_authenticated(&self) -> Option<UserProfile> {
        match self.wait_until_resolved().await {
            AuthState::Authenticated(profile) => Some(profile),
            _ => {
                info!("Redirecting to login: no authentication");
                self.navigator.navigate(&self.login_route);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::http_client::{ApiResponse, Transport};
    use crate::auth::storage::CredentialKey;
    use crate::navigation::RecordingNavigator;
    use crate::settings::AuthSettings;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct SlowTransport {
        replies: Mutex<VecDeque<ApiResponse>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn execute(
            &self,
            _request: &ApiRequest,
            _bearer: Option<&str>,
        ) -> Result<ApiResponse, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| ApiResponse::new(500, "no reply scripted")))
        }
    }

    const PROFILE_JSON: &str =
        r#"{"id":"1","name":"Jane Doe","email":"jane@example.com","roles":["admin"]}"#;

    fn controller(
        replies: Vec<ApiResponse>,
        delay_ms: u64,
    ) -> (Arc<SessionController>, Arc<SlowTransport>, Arc<RecordingNavigator>) {
        let transport = Arc::new(SlowTransport {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
        });
        let state = Arc::new(SessionState::new());
        let nav = Arc::new(RecordingNavigator::new());
        let settings = AuthSettings::default();
        let gateway = Arc::new(HttpGateway::new(
            transport.clone(),
            CredentialStore::in_memory(),
            state.clone(),
            nav.clone(),
            &settings,
        ));
        let controller = Arc::new(SessionController::new(
            gateway,
            state,
            nav.clone(),
            settings.login_route,
        ));
        (controller, transport, nav)
    }

    #[tokio::test]
    async fn test_concurrent_fetches_are_coalesced() {
        let (ctl, transport, _) = controller(vec![ApiResponse::new(200, PROFILE_JSON)], 50);

        let (a, b) = tokio::join!(ctl.fetch_user_data(), ctl.fetch_user_data());

        assert_eq!(a.unwrap().id, "1");
        assert_eq!(b.unwrap().id, "1");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(ctl.is_authenticated());
        assert!(!ctl.is_loading());
    }

    #[tokio::test]
    async fn test_sequential_fetches_each_hit_network() {
        let (ctl, transport, _) = controller(
            vec![
                ApiResponse::new(200, PROFILE_JSON),
                ApiResponse::new(
                    200,
                    r#"{"id":"1","name":"Jane Renamed","email":"jane@example.com"}"#,
                ),
            ],
            0,
        );

        ctl.fetch_user_data().await.unwrap();
        let second = ctl.fetch_user_data().await.unwrap();

        assert_eq!(second.name, "Jane Renamed");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctl.user().unwrap().name, "Jane Renamed");
    }

    #[tokio::test]
    async fn test_fetch_resolving_after_logout_is_discarded() {
        let (ctl, _, _) = controller(vec![ApiResponse::new(200, PROFILE_JSON)], 50);

        let fetch = {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move { ctl.fetch_user_data().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctl.logout();

        assert_eq!(fetch.await.unwrap().unwrap_err(), AuthError::NoSession);
        assert_eq!(ctl.state(), AuthState::Unauthenticated);
        assert!(ctl.store().read(CredentialKey::Profile).is_none());
    }

    #[tokio::test]
    async fn test_abandoned_fetch_does_not_leave_loading_set() {
        let (ctl, _, _) = controller(vec![ApiResponse::new(200, PROFILE_JSON)], 200);
        ctl.state.resolve_unauthenticated();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), ctl.fetch_user_data()).await;

        assert!(abandoned.is_err());
        assert!(!ctl.is_loading());
        assert_eq!(ctl.fetches_in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_other_failure_keeps_state() {
        let (ctl, _, nav) = controller(
            vec![
                ApiResponse::new(200, PROFILE_JSON),
                ApiResponse::new(503, "maintenance"),
            ],
            0,
        );
        ctl.fetch_user_data().await.unwrap();

        let err = ctl.fetch_user_data().await.unwrap_err();
        assert_eq!(
            err,
            AuthError::ApiError {
                status: 503,
                body: "maintenance".to_string()
            }
        );
        assert!(ctl.is_authenticated());
        assert!(nav.routes().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_profile_is_decode_error() {
        let (ctl, _, _) = controller(vec![ApiResponse::new(200, "<html></html>")], 0);
        let err = ctl.fetch_user_data().await.unwrap_err();
        assert!(matches!(err, AuthError::DecodeError(_)));
        assert_eq!(ctl.state(), AuthState::Initializing);
    }

    #[tokio::test]
    async fn test_hydrate_runs_once() {
        let (ctl, transport, _) = controller(vec![], 0);
        assert_eq!(ctl.hydrate().await.unwrap(), AuthState::Unauthenticated);
        ctl.store().write(CredentialKey::AccessToken, "tok").unwrap();
        assert_eq!(ctl.hydrate().await.unwrap(), AuthState::Unauthenticated);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_set_tokens_reports_success() {
        let (ctl, _, _) = controller(
            vec![
                ApiResponse::new(200, PROFILE_JSON),
                ApiResponse::new(500, "down"),
            ],
            0,
        );
        assert!(ctl.set_tokens().await);
        assert!(!ctl.set_tokens().await);
    }

    #[tokio::test]
    async fn test_require_authenticated_redirects_when_logged_out() {
        let (ctl, _, nav) = controller(vec![], 0);
        ctl.hydrate().await.unwrap();
        assert!(ctl.require_authenticated().await.is_none());
        assert_eq!(nav.last_route().as_deref(), Some("/login"));
    }
}
