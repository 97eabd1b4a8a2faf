//! Tenant Resolution
//!
//! Derives the tenant subdomain from the active hostname with no network I/O.
//! `toyland.selfmachine.com.br` belongs to the `toyland` tenant; a bare
//! registrable domain, `localhost` or an IP literal is the platform context
//! (no tenant), which is where super-admin accounts log in.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static IPV4_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+\.\d+$").expect("static regex"));

/// Tenant record as served by `GET /empresas/subdomain/:subdomain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub subdomain: String,
    /// Display name shown on the login screen.
    pub nome: String,
}

/// Resolve the tenant subdomain for a hostname.
///
/// Pure and side-effect-free. Returns `None` for `localhost`, dotted-quad
/// IPv4 literals, and hostnames with two or fewer labels (the bare domain is
/// the platform context, not a tenant).
pub fn resolve_subdomain(hostname: &str) -> Option<String> {
    if hostname == "localhost" || IPV4_LITERAL.is_match(hostname) {
        return None;
    }

    let labels: Vec<&str> = hostname.split('.').collect();
    if labels.len() > 2 {
        Some(labels[0].to_string())
    } else {
        None
    }
}

/// Subdomain value for the `X-Tenant-Subdomain` outbound header.
///
/// Looser than [`resolve_subdomain`]: the backend ignores the header when it
/// does not match a tenant, so any first label other than `www`/`localhost`
/// is forwarded.
pub fn header_subdomain(hostname: &str) -> Option<String> {
    let first = hostname.split('.').next().unwrap_or("");
    if first.is_empty() || first == "www" || first == "localhost" {
        None
    } else {
        Some(first.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_labels_resolve_to_first() {
        assert_eq!(
            resolve_subdomain("toyland.selfmachine.com.br"),
            Some("toyland".to_string())
        );
        assert_eq!(
            resolve_subdomain("acme.example.com"),
            Some("acme".to_string())
        );
    }

    #[test]
    fn test_local_contexts_have_no_tenant() {
        assert_eq!(resolve_subdomain("localhost"), None);
        assert_eq!(resolve_subdomain("127.0.0.1"), None);
        assert_eq!(resolve_subdomain("192.168.0.10"), None);
    }

    #[test]
    fn test_bare_domain_is_platform_context() {
        assert_eq!(resolve_subdomain("example.com"), None);
        assert_eq!(resolve_subdomain("selfmachine"), None);
    }

    #[test]
    fn test_idempotent() {
        let a = resolve_subdomain("toyland.selfmachine.com.br");
        let b = resolve_subdomain("toyland.selfmachine.com.br");
        assert_eq!(a, b);
    }

    #[test]
    fn test_header_subdomain_skips_www_and_localhost() {
        assert_eq!(header_subdomain("www.selfmachine.com.br"), None);
        assert_eq!(header_subdomain("localhost"), None);
        assert_eq!(
            header_subdomain("toyland.selfmachine.com.br"),
            Some("toyland".to_string())
        );
        // The header rule forwards even a bare first label; the resolver does not.
        assert_eq!(header_subdomain("example.com"), Some("example".to_string()));
    }
}
