//! Shared session state cell
//!
//! Holds the single `AuthState` seen by the controller, the gateway and any
//! observers. Every transition goes through here so the idempotence of
//! `* -> Unauthenticated` is enforced in one place.

use super::types::{AuthState, UserProfile};
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Observable auth state plus a session epoch.
///
/// The epoch increases on every invalidation. A network result captured under
/// an older epoch belongs to a session that no longer exists and must not be
/// applied.
pub struct SessionState {
    tx: watch::Sender<AuthState>,
    epoch: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::Initializing);
        Self {
            tx,
            epoch: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current state
    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Receiver that sees every subsequent transition
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// Wait until the state has left `Initializing`
    pub async fn wait_until_resolved(&self) -> AuthState {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let state = match rx.wait_for(AuthState::is_resolved).await {
            Ok(state) => state.clone(),
            Err(_) => self.current(),
        };
        state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn authenticate(&self, profile: UserProfile) {
        info!("Auth state -> Authenticated ({})", profile.email);
        self.tx.send_replace(AuthState::Authenticated(profile));
    }

    /// Move to `Unauthenticated`. Returns `true` if this call changed the state.
    pub(crate) fn invalidate(&self) -> bool {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let changed = self.tx.send_if_modified(|state| {
            if matches!(state, AuthState::Unauthenticated) {
                false
            } else {
                *state = AuthState::Unauthenticated;
                true
            }
        });
        if changed {
            info!("Auth state -> Unauthenticated");
        } else {
            debug!("Auth state already Unauthenticated");
        }
        changed
    }

    /// Resolve a pending `Initializing` to `Unauthenticated` without touching an
    /// already resolved state.
    pub(crate) fn resolve_unauthenticated(&self) {
        let changed = self.tx.send_if_modified(|state| {
            if matches!(state, AuthState::Initializing) {
                *state = AuthState::Unauthenticated;
                true
            } else {
                false
            }
        });
        if changed {
            info!("Auth state resolved -> Unauthenticated");
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
