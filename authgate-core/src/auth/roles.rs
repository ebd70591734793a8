//! Role checks against the current profile

use super::types::AuthState;

pub struct RoleGate;

impl RoleGate {
    /// `true` iff the state carries a profile whose role set contains `role`.
    pub fn has_role(state: &AuthState, role: &str) -> bool {
        state
            .profile()
            .and_then(|profile| profile.roles.as_ref())
            .map(|roles| roles.contains(role))
            .unwrap_or(false)
    }
}
