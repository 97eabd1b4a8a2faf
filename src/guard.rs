//! Route Guard
//!
//! Pure navigation decisions. The guard never performs the redirect itself;
//! the shell reads the returned value and navigates. Call it on every
//! navigation attempt — the session can change between calls.

use crate::auth::{AuthSnapshot, AuthState};

/// Capability a route requires to be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Any authenticated user.
    Authenticated,
    /// ADMIN or SUPER_ADMIN only.
    AdminOnly,
}

/// Outcome of a navigation attempt. Denials are redirects, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    RedirectToLogin,
    RedirectToHome,
    /// Bootstrap has not finished; show a neutral loading state, never a
    /// flash of denied content.
    Pending,
}

/// Decide whether the current session may enter a route.
pub fn can_enter(snapshot: &AuthSnapshot, required: Capability) -> RouteDecision {
    if !snapshot.bootstrapped {
        return RouteDecision::Pending;
    }

    let user = match (&snapshot.state, &snapshot.user) {
        (AuthState::Authenticated, Some(user)) => user,
        _ => return RouteDecision::RedirectToLogin,
    };

    if required == Capability::AdminOnly && !user.role.is_admin() {
        return RouteDecision::RedirectToHome;
    }

    RouteDecision::Allow
}
