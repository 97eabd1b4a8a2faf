//! SelfMachine Core
//!
//! Tenant/session resolution, access control and the machine-activity
//! freshness monitor for the SelfMachine multi-tenant vending platform.
//!
//! # Architecture
//!
//! ```text
//! hostname ──► TenantResolver ──► AuthMachine ──► Backend API
//!                                    │  ▲
//!                              SessionStore (durable, header sync)
//!                                    │
//!                              AuthSnapshot ──► RouteGuard
//!
//! machines + movimentacoes ──► ActivityMonitor ──► ActivityReport
//! ```
//!
//! The auth machine is the sole writer of the session store; everything else
//! consumes its published snapshot. The activity monitor is independent and
//! pure — it only derives a report from lists the API client fetched.

pub mod activity;
pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod session;
pub mod store;
pub mod tenant;

pub use activity::{ActivityReport, Machine, MovementEvent, ReportStatus, INACTIVITY_WINDOW_HOURS};
pub use api::{ApiClient, ApiError, AuthResponse, HeaderCell, LoginRequest, RegisterRequest};
pub use auth::{AuthError, AuthMachine, AuthSnapshot, AuthState};
pub use config::Config;
pub use guard::{can_enter, Capability, RouteDecision};
pub use session::{Role, Session, UserProfile};
pub use store::{SessionStore, StoreError};
pub use tenant::{header_subdomain, resolve_subdomain, Tenant};
