//! Wiring: builds the store, gateway, controller and actions from settings

use crate::auth::{
    AuthActions, AuthError, CookieTier, CredentialStore, HttpGateway, LocalStorageTier,
    ReqwestTransport, SessionController, SessionState, Transport,
};
use crate::navigation::Navigator;
use crate::settings::AuthSettings;
use log::info;
use std::sync::Arc;

/// One application's session layer
pub struct AuthGate {
    settings: AuthSettings,
    cookies: Arc<CookieTier>,
    controller: Arc<SessionController>,
    actions: AuthActions,
}

impl AuthGate {
    /// Build with the `reqwest` transport. The cookie tier doubles as the HTTP
    /// client's cookie provider.
    pub fn from_settings(
        settings: AuthSettings,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, AuthError> {
        let (cookies, local) = Self::open_tiers(&settings)?;
        let transport = Arc::new(ReqwestTransport::new(&settings, Arc::clone(&cookies))?);
        Ok(Self::assemble(settings, cookies, local, transport, navigator))
    }

    /// Build with a caller-supplied transport
    pub fn with_transport(
        settings: AuthSettings,
        transport: Arc<dyn Transport>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, AuthError> {
        let (cookies, local) = Self::open_tiers(&settings)?;
        Ok(Self::assemble(settings, cookies, local, transport, navigator))
    }

    fn open_tiers(
        settings: &AuthSettings,
    ) -> Result<(Arc<CookieTier>, Arc<LocalStorageTier>), AuthError> {
        let origin = settings.base_url()?;

        let (cookies, local) = if settings.persist {
            let dir = settings.store_dir();
            std::fs::create_dir_all(&dir).map_err(|e| {
                AuthError::StorageError(format!("Failed to create data directory: {}", e))
            })?;
            info!("Session stores in {}", dir.display());
            (CookieTier::open(&dir), LocalStorageTier::open(&dir))
        } else {
            info!("Session stores in memory only");
            (CookieTier::in_memory(), LocalStorageTier::in_memory())
        };

        let cookies = cookies.with_origin(origin);
        cookies.set_enabled(settings.cookies_enabled);
        Ok((Arc::new(cookies), Arc::new(local)))
    }

    fn assemble(
        settings: AuthSettings,
        cookies: Arc<CookieTier>,
        local: Arc<LocalStorageTier>,
        transport: Arc<dyn Transport>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let store = CredentialStore::new(cookies.clone(), local);
        let state = Arc::new(SessionState::new());
        let gateway = Arc::new(HttpGateway::new(
            transport,
            store,
            Arc::clone(&state),
            Arc::clone(&navigator),
            &settings,
        ));
        let controller = Arc::new(SessionController::new(
            gateway,
            state,
            navigator,
            settings.login_route.clone(),
        ));
        let actions = AuthActions::new(Arc::clone(&controller));

        Self {
            settings,
            cookies,
            controller,
            actions,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn cookies(&self) -> &Arc<CookieTier> {
        &self.cookies
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn actions(&self) -> &AuthActions {
        &self.actions
    }

    pub fn store(&self) -> &CredentialStore {
        self.controller.store()
    }
}
