//! Auth State Machine
//!
//! Orchestrates login, registration and logout against the backend, owns all
//! writes to the durable session store, and publishes a read-only snapshot
//! over a watch channel for route guards and views.
//!
//! States: `Unauthenticated -> Authenticating -> Authenticated`, back to
//! `Unauthenticated` on logout, failed attempt, or any 401 anywhere.
//!
//! Bootstrap is stale-trust: a well-formed durable session starts the machine
//! `Authenticated` with no network round trip; the token's validity is only
//! discovered on the first API call that answers 401.
//!
//! Every in-flight operation is stamped with a generation counter. Logout and
//! 401 teardown bump it, so a slow login response that lands afterwards is
//! discarded instead of resurrecting the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, AuthResponse, LoginRequest, RegisterRequest};
use crate::session::{Session, UserProfile};
use crate::store::{SessionStore, StoreError};
use crate::tenant::{self, Tenant};

/// Machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Read-only view published to consumers. Treat as immutable once obtained
/// for a given decision; re-read on every navigation.
#[derive(Debug, Clone)]
pub struct AuthSnapshot {
    pub state: AuthState,
    /// False until the async bootstrap (tenant pre-resolution) has finished.
    /// Guards return `Pending` while this is false.
    pub bootstrapped: bool,
    pub user: Option<UserProfile>,
    pub tenant: Option<Tenant>,
    /// Tenant subdomain resolved from the hostname, fixed per process.
    pub subdomain: Option<String>,
}

impl AuthSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated && self.user.is_some()
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// The attempt was rejected; carries the server-reported reason when one
    /// was available, otherwise the product fallback message.
    #[error("{0}")]
    Rejected(String),

    /// The response arrived for a superseded operation (a logout or teardown
    /// happened first) and was discarded.
    #[error("operation superseded")]
    Superseded,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// The state machine. Sole writer of the session store.
pub struct AuthMachine {
    api: ApiClient,
    store: SessionStore,
    subdomain: Option<String>,
    generation: AtomicU64,
    snapshot: watch::Sender<AuthSnapshot>,
}

impl AuthMachine {
    /// Build the machine, recovering any durable session synchronously
    /// (stale-trust), and install the 401 teardown hook on the API client.
    pub fn new(api: ApiClient, store: SessionStore, hostname: &str) -> Arc<Self> {
        let subdomain = tenant::resolve_subdomain(hostname);
        let recovered = store.load();

        let state = if recovered.is_authenticated() {
            info!("recovered durable session for user {}", recovered.user().map(|u| u.id.as_str()).unwrap_or("?"));
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };

        let (snapshot, _) = watch::channel(AuthSnapshot {
            state,
            bootstrapped: false,
            user: recovered.user().cloned(),
            tenant: recovered.tenant().cloned(),
            subdomain: subdomain.clone(),
        });

        let machine = Arc::new(Self {
            api,
            store,
            subdomain,
            generation: AtomicU64::new(0),
            snapshot,
        });

        let weak = Arc::downgrade(&machine);
        machine.api.set_unauthorized_hook(Arc::new(move || {
            if let Some(machine) = weak.upgrade() {
                machine.invalidate_session();
            }
        }));

        machine
    }

    /// Current snapshot. Cheap clone; never cache across navigations.
    pub fn current(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Change-notification channel for reactive consumers.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }

    /// Async half of the bootstrap: pre-resolve the tenant display record for
    /// the login screen, then mark the machine bootstrapped. Guards stay
    /// `Pending` until this completes.
    pub async fn bootstrap(&self) {
        if let Some(sub) = self.subdomain.clone() {
            match self.api.tenant_by_subdomain(&sub).await {
                Ok(tenant) => {
                    debug!("pre-resolved tenant {} ({})", tenant.nome, tenant.subdomain);
                    self.snapshot.send_modify(|s| {
                        // A super-admin session never carries a tenant.
                        let is_super = s
                            .user
                            .as_ref()
                            .map(|u| u.role == crate::session::Role::SuperAdmin)
                            .unwrap_or(false);
                        if !is_super {
                            s.tenant = Some(tenant);
                        }
                    });
                }
                Err(e) => {
                    warn!("tenant pre-resolution failed for {}: {}", sub, e);
                    self.snapshot.send_modify(|s| {
                        if s.state != AuthState::Authenticated {
                            s.tenant = None;
                        }
                    });
                }
            }
        }

        self.snapshot.send_modify(|s| s.bootstrapped = true);
        debug!("bootstrap complete");
    }

    /// Exchange credentials for a session. Tenant-scoped when the hostname
    /// resolves to a subdomain, platform-level otherwise.
    pub async fn login(&self, email: &str, senha: &str) -> Result<(), AuthError> {
        let gen = self.generation.load(Ordering::SeqCst);
        self.set_state(AuthState::Authenticating);

        let body = LoginRequest {
            email: email.to_string(),
            senha: senha.to_string(),
            subdomain: self.subdomain.clone(),
        };

        match self.api.login(&body).await {
            Ok(response) => self.apply_auth_response(gen, response),
            Err(e) => Err(self.reject(gen, e, "Erro ao fazer login")),
        }
    }

    /// Create an account. Always forwards the resolved subdomain; the backend
    /// rejects registration with no resolvable tenant.
    pub async fn register(
        &self,
        nome: &str,
        email: &str,
        senha: &str,
        telefone: &str,
    ) -> Result<(), AuthError> {
        let gen = self.generation.load(Ordering::SeqCst);
        self.set_state(AuthState::Authenticating);

        let body = RegisterRequest {
            nome: nome.to_string(),
            email: email.to_string(),
            senha: senha.to_string(),
            telefone: telefone.to_string(),
            subdomain: self.subdomain.clone(),
        };

        match self.api.register(&body).await {
            Ok(response) => self.apply_auth_response(gen, response),
            Err(e) => Err(self.reject(gen, e, "Erro ao registrar")),
        }
    }

    /// Unconditional teardown. Never fails from the caller's perspective and
    /// is safe in any state, including already-unauthenticated.
    pub fn logout(&self) {
        self.teardown("logout");
    }

    /// 401-driven teardown, fired by the API client hook from any endpoint.
    pub fn invalidate_session(&self) {
        self.teardown("session invalidated by backend (401)");
    }

    /// Apply a successful credential exchange, unless a newer operation
    /// (logout, teardown) superseded it while the response was in flight.
    fn apply_auth_response(&self, gen: u64, response: AuthResponse) -> Result<(), AuthError> {
        if self.generation.load(Ordering::SeqCst) != gen {
            info!("discarding auth response from superseded operation");
            return Err(AuthError::Superseded);
        }

        let session = Session::authenticated(response.token, response.usuario, response.empresa);
        self.store.save(&session)?;

        self.snapshot.send_modify(|s| {
            s.state = AuthState::Authenticated;
            s.user = session.user().cloned();
            s.tenant = session.tenant().cloned();
        });
        info!("authenticated as {:?}", session.role());
        Ok(())
    }

    /// Map a failed attempt to a structured rejection without touching the
    /// store; the 401 case has already torn the session down via the hook.
    fn reject(&self, gen: u64, err: ApiError, fallback: &str) -> AuthError {
        let message = err
            .server_message()
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string());
        warn!("auth attempt failed: {}", message);

        if self.generation.load(Ordering::SeqCst) == gen {
            self.set_state(AuthState::Unauthenticated);
        }
        AuthError::Rejected(message)
    }

    fn teardown(&self, reason: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.store.clear() {
            // Teardown must still leave the in-memory state unauthenticated.
            warn!("durable clear failed during teardown: {}", e);
        }
        self.snapshot.send_modify(|s| {
            s.state = AuthState::Unauthenticated;
            s.user = None;
            s.tenant = None;
        });
        info!("session torn down: {}", reason);
    }

    fn set_state(&self, new_state: AuthState) {
        self.snapshot.send_modify(|s| {
            if s.state != new_state {
                debug!("auth state: {:?} -> {:?}", s.state, new_state);
                s.state = new_state;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HeaderCell;
    use crate::session::Role;
    use tempfile::TempDir;

    fn machine_with_store(hostname: &str) -> (Arc<AuthMachine>, TempDir) {
        let temp = TempDir::new().unwrap();
        let headers = HeaderCell::new();
        let store = SessionStore::open(temp.path(), headers.clone()).unwrap();
        let api = ApiClient::new("http://backend.invalid/api", hostname, headers);
        (AuthMachine::new(api, store, hostname), temp)
    }

    fn user(role: Role) -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            nome: "Maria".to_string(),
            email: None,
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

    fn auth_response(role: Role) -> AuthResponse {
        AuthResponse {
            token: "tok-xyz".to_string(),
            usuario: user(role),
            empresa: Some(tenant()),
        }
    }

    #[test]
    fn test_cold_start_is_unauthenticated_and_pending() {
        let (machine, _temp) = machine_with_store("toyland.selfmachine.com.br");
        let snap = machine.current();
        assert_eq!(snap.state, AuthState::Unauthenticated);
        assert!(!snap.bootstrapped);
        assert_eq!(snap.subdomain.as_deref(), Some("toyland"));
    }

    #[test]
    fn test_stale_trust_bootstrap_from_durable_session() {
        let temp = TempDir::new().unwrap();
        {
            let store = SessionStore::open(temp.path(), HeaderCell::new()).unwrap();
            store
                .save(&Session::authenticated(
                    "tok".to_string(),
                    user(Role::Admin),
                    Some(tenant()),
                ))
                .unwrap();
        }

        let headers = HeaderCell::new();
        let store = SessionStore::open(temp.path(), headers.clone()).unwrap();
        let api = ApiClient::new("http://backend.invalid/api", "toyland.selfmachine.com.br", headers);
        let machine = AuthMachine::new(api, store, "toyland.selfmachine.com.br");

        // Authenticated without any network round trip.
        let snap = machine.current();
        assert_eq!(snap.state, AuthState::Authenticated);
        assert!(snap.is_authenticated());
        assert_eq!(snap.user.as_ref().map(|u| u.role), Some(Role::Admin));
    }

    #[test]
    fn test_apply_response_persists_and_publishes() {
        let (machine, _temp) = machine_with_store("toyland.selfmachine.com.br");
        let gen = machine.generation.load(Ordering::SeqCst);

        machine.apply_auth_response(gen, auth_response(Role::Admin)).unwrap();

        let snap = machine.current();
        assert_eq!(snap.state, AuthState::Authenticated);
        assert_eq!(snap.tenant.as_ref().map(|t| t.subdomain.as_str()), Some("toyland"));
        assert!(machine.store.load().is_authenticated());
    }

    #[test]
    fn test_super_admin_tenant_cleared_even_if_present_in_response() {
        let (machine, _temp) = machine_with_store("toyland.selfmachine.com.br");
        let gen = machine.generation.load(Ordering::SeqCst);

        machine
            .apply_auth_response(gen, auth_response(Role::SuperAdmin))
            .unwrap();

        let snap = machine.current();
        assert!(snap.tenant.is_none());
        assert!(machine.store.load().tenant().is_none());
    }

    #[test]
    fn test_logout_clears_everything() {
        let (machine, _temp) = machine_with_store("toyland.selfmachine.com.br");
        let gen = machine.generation.load(Ordering::SeqCst);
        machine.apply_auth_response(gen, auth_response(Role::Admin)).unwrap();

        machine.logout();

        let snap = machine.current();
        assert_eq!(snap.state, AuthState::Unauthenticated);
        assert!(snap.user.is_none());
        assert_eq!(machine.store.load(), Session::empty());

        // Safe to call again from the unauthenticated state.
        machine.logout();
    }

    #[test]
    fn test_slow_login_after_logout_is_discarded() {
        let (machine, _temp) = machine_with_store("toyland.selfmachine.com.br");

        // Login starts, captures its generation...
        let stale_gen = machine.generation.load(Ordering::SeqCst);
        // ...user logs out while the response is in flight...
        machine.logout();
        // ...then the slow response lands.
        let result = machine.apply_auth_response(stale_gen, auth_response(Role::Admin));

        assert!(matches!(result, Err(AuthError::Superseded)));
        assert_eq!(machine.current().state, AuthState::Unauthenticated);
        assert_eq!(machine.store.load(), Session::empty());
    }

    #[test]
    fn test_invalidate_session_behaves_like_401() {
        let (machine, _temp) = machine_with_store("toyland.selfmachine.com.br");
        let gen = machine.generation.load(Ordering::SeqCst);
        machine.apply_auth_response(gen, auth_response(Role::Funcionario)).unwrap();

        machine.invalidate_session();

        assert_eq!(machine.current().state, AuthState::Unauthenticated);
        assert_eq!(machine.store.load(), Session::empty());
        assert!(machine.store.headers().bearer().is_none());
    }

    #[test]
    fn test_rejection_keeps_store_untouched() {
        let (machine, _temp) = machine_with_store("toyland.selfmachine.com.br");
        let gen = machine.generation.load(Ordering::SeqCst);

        let err = machine.reject(
            gen,
            ApiError::Rejected {
                status: 400,
                message: "Senha inválida".to_string(),
            },
            "Erro ao fazer login",
        );

        assert_eq!(err.to_string(), "Senha inválida");
        assert_eq!(machine.current().state, AuthState::Unauthenticated);
        assert_eq!(machine.store.load(), Session::empty());
    }

    #[test]
    fn test_rejection_falls_back_to_generic_message() {
        let (machine, _temp) = machine_with_store("toyland.selfmachine.com.br");
        let gen = machine.generation.load(Ordering::SeqCst);

        let err = machine.reject(gen, ApiError::Unauthorized, "Erro ao fazer login");
        assert_eq!(err.to_string(), "Erro ao fazer login");
    }

    #[tokio::test]
    async fn test_bootstrap_without_subdomain_just_flips_flag() {
        let (machine, _temp) = machine_with_store("localhost");
        assert!(!machine.current().bootstrapped);

        machine.bootstrap().await;

        let snap = machine.current();
        assert!(snap.bootstrapped);
        assert!(snap.subdomain.is_none());
        assert!(snap.tenant.is_none());
    }
}
