//! Backend REST Client
//!
//! Thin client for the SelfMachine backend API. Holds the outbound header
//! state (`Authorization`, `X-Tenant-Subdomain`, `X-Loja-Id`) in a shared
//! cell written by the session store, so call sites never re-read durable
//! storage. Any 401 response fires the installed unauthorized hook before
//! surfacing, which tears the session down no matter which call hit it.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::activity::{Machine, MovementEvent};
use crate::session::UserProfile;
use crate::tenant::{self, Tenant};

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the credential. Session teardown has already
    /// been triggered through the unauthorized hook by the time callers see
    /// this.
    #[error("unauthorized")]
    Unauthorized,

    /// Non-2xx response carrying the server-reported reason when present.
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

impl ApiError {
    /// Server-reported reason, if this is a rejection that carried one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Default outbound headers, shared between the session store (writer) and
/// the API client (reader).
#[derive(Clone, Default)]
pub struct HeaderCell {
    inner: Arc<RwLock<OutboundHeaders>>,
}

#[derive(Debug, Clone, Default)]
struct OutboundHeaders {
    bearer: Option<String>,
    loja_id: Option<String>,
}

impl HeaderCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bearer(&self, token: Option<&str>) {
        self.inner.write().bearer = token.map(|t| t.to_string());
    }

    pub fn set_loja(&self, loja_id: Option<&str>) {
        self.inner.write().loja_id = loja_id.map(|l| l.to_string());
    }

    pub fn bearer(&self) -> Option<String> {
        self.inner.read().bearer.clone()
    }

    pub fn loja(&self) -> Option<String> {
        self.inner.read().loja_id.clone()
    }

    /// Drop both credential-derived headers. Called on logout/401.
    pub fn clear(&self) {
        let mut headers = self.inner.write();
        headers.bearer = None;
        headers.loja_id = None;
    }
}

/// Body for `POST /auth/login`. The subdomain is omitted for platform-level
/// (super-admin) logins.
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub senha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
}

/// Body for `POST /auth/registrar`. Registration is always tenant-scoped.
#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub nome: String,
    pub email: String,
    pub senha: String,
    pub telefone: String,
    pub subdomain: Option<String>,
}

/// Response shape shared by login and registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub usuario: UserProfile,
    #[serde(default)]
    pub empresa: Option<Tenant>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Backend API client.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    headers: HeaderCell,
    /// Resolved once per process from the configured hostname; the tenant
    /// does not change without a full restart.
    tenant_header: Option<String>,
    on_unauthorized: Arc<RwLock<Option<UnauthorizedHook>>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, hostname: &str, headers: HeaderCell) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant_header: tenant::header_subdomain(hostname),
            headers,
            on_unauthorized: Arc::new(RwLock::new(None)),
        }
    }

    /// Install the hook fired on any 401 response. The auth machine installs
    /// its teardown here; the hook must be cheap and non-blocking.
    pub fn set_unauthorized_hook(&self, hook: UnauthorizedHook) {
        *self.on_unauthorized.write() = Some(hook);
    }

    pub fn headers(&self) -> &HeaderCell {
        &self.headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn decorate(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = self.headers.bearer() {
            req = req.bearer_auth(token);
        }
        if let Some(sub) = &self.tenant_header {
            req = req.header("X-Tenant-Subdomain", sub);
        }
        if let Some(loja) = self.headers.loja() {
            req = req.header("X-Loja-Id", loja);
        }
        req
    }

    /// Map a non-success response to an error, firing the teardown hook on
    /// 401 regardless of which endpoint was hit.
    async fn check(&self, response: reqwest::Response, fallback: &str) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("401 from backend, tearing down session");
            if let Some(hook) = self.on_unauthorized.read().clone() {
                hook();
            }
            return Err(ApiError::Unauthorized);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| fallback.to_string());

        Err(ApiError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// `POST /auth/login`
    pub async fn login(&self, body: &LoginRequest) -> Result<AuthResponse, ApiError> {
        debug!("POST /auth/login (subdomain={:?})", body.subdomain);
        let response = self
            .decorate(self.client.post(self.url("/auth/login")))
            .json(body)
            .send()
            .await?;
        let response = self.check(response, "Erro ao fazer login").await?;
        Ok(response.json().await?)
    }

    /// `POST /auth/registrar`
    pub async fn register(&self, body: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        debug!("POST /auth/registrar (subdomain={:?})", body.subdomain);
        let response = self
            .decorate(self.client.post(self.url("/auth/registrar")))
            .json(body)
            .send()
            .await?;
        let response = self.check(response, "Erro ao registrar").await?;
        Ok(response.json().await?)
    }

    /// `GET /empresas/subdomain/:subdomain` — pre-resolves the tenant record
    /// for the login screen.
    pub async fn tenant_by_subdomain(&self, subdomain: &str) -> Result<Tenant, ApiError> {
        let response = self
            .decorate(
                self.client
                    .get(self.url(&format!("/empresas/subdomain/{}", subdomain))),
            )
            .send()
            .await?;
        let response = self.check(response, "Empresa não encontrada").await?;
        Ok(response.json().await?)
    }

    /// `GET /maquinas?lojaId=...`
    pub async fn machines(&self, loja_id: &str) -> Result<Vec<Machine>, ApiError> {
        let response = self
            .decorate(self.client.get(self.url("/maquinas")))
            .query(&[("lojaId", loja_id)])
            .send()
            .await?;
        let response = self.check(response, "Erro ao buscar máquinas").await?;
        Ok(response.json().await?)
    }

    /// `GET /movimentacoes?lojaId=...&desde=<ISO-8601>`
    pub async fn movements_since(
        &self,
        loja_id: &str,
        desde: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<MovementEvent>, ApiError> {
        let response = self
            .decorate(self.client.get(self.url("/movimentacoes")))
            .query(&[("lojaId", loja_id), ("desde", &desde.to_rfc3339())])
            .send()
            .await?;
        let response = self.check(response, "Erro ao buscar movimentações").await?;
        Ok(response.json().await?)
    }
}
