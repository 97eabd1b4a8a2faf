//! Session Model
//!
//! The in-memory record of who is logged in: bearer token, user profile and
//! resolved tenant. Two invariants hold for every constructed value:
//!
//! - token present ⇔ user profile present (a token without a profile is not
//!   a valid session)
//! - the tenant is absent when the user is a SUPER_ADMIN (platform accounts
//!   are not scoped to one tenant)

use serde::{Deserialize, Serialize};

use crate::tenant::Tenant;

/// Authorization role. The sole authorization axis of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Funcionario,
}

impl Role {
    /// Whether this role may enter admin-only views.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// User profile as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub nome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
}

/// Composite session: credential, profile and tenant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    token: Option<String>,
    user: Option<UserProfile>,
    tenant: Option<Tenant>,
}

impl Session {
    /// The absent session.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an authenticated session, normalizing the invariants: a
    /// SUPER_ADMIN never keeps a tenant, even if the backend sent one.
    pub fn authenticated(token: String, user: UserProfile, tenant: Option<Tenant>) -> Self {
        let tenant = if user.role == Role::SuperAdmin {
            None
        } else {
            tenant
        };
        Self {
            token: Some(token),
            user: Some(user),
            tenant,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn tenant(&self) -> Option<&Tenant> {
        self.tenant.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role().map(|r| r.is_admin()).unwrap_or(false)
    }

    pub fn is_super_admin(&self) -> bool {
        self.role() == Some(Role::SuperAdmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            nome: "Maria".to_string(),
            email: Some("maria@toyland.com.br".to_string()),
            role,
        }
    }

    fn tenant() -> Tenant {
        Tenant {
            id: "t1".to_string(),
            subdomain: "toyland".to_string(),
            nome: "Toyland".to_string(),
        }
    }

    #[test]
    fn test_empty_session_is_unauthenticated() {
        let s = Session::empty();
        assert!(!s.is_authenticated());
        assert!(s.token().is_none());
        assert!(s.user().is_none());
        assert!(s.tenant().is_none());
    }

    #[test]
    fn test_super_admin_tenant_is_dropped() {
        let s = Session::authenticated("tok".into(), user(Role::SuperAdmin), Some(tenant()));
        assert!(s.is_authenticated());
        assert!(s.is_super_admin());
        assert!(s.tenant().is_none());
    }

    #[test]
    fn test_regular_user_keeps_tenant() {
        let s = Session::authenticated("tok".into(), user(Role::Funcionario), Some(tenant()));
        assert_eq!(s.tenant().map(|t| t.subdomain.as_str()), Some("toyland"));
        assert!(!s.is_admin());
    }

    #[test]
    fn test_role_wire_form() {
        assert_eq!(
            serde_json::to_string(&Role::SuperAdmin).unwrap(),
            "\"SUPER_ADMIN\""
        );
        assert_eq!(
            serde_json::from_str::<Role>("\"FUNCIONARIO\"").unwrap(),
            Role::Funcionario
        );
    }

    #[test]
    fn test_admin_predicates() {
        assert!(Role::Admin.is_admin());
        assert!(Role::SuperAdmin.is_admin());
        assert!(!Role::Funcionario.is_admin());
    }
}
