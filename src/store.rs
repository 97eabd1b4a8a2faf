//! Durable Session Store
//!
//! Process-restart-surviving storage for the credential, user profile,
//! resolved tenant and remembered store selection. One file per key under a
//! config-owned directory, written atomically via temp file + rename.
//!
//! The store is the single source of truth for "who is logged in": every
//! `save`/`clear` also synchronizes the outbound header cell so subsequent
//! API calls carry the right credential without re-reading disk.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use crate::api::HeaderCell;
use crate::session::{Session, UserProfile};
use crate::tenant::Tenant;

/// Durable key files. All four are cleared together on logout/401.
const TOKEN_KEY: &str = "token";
const USER_KEY: &str = "usuario.json";
const TENANT_KEY: &str = "empresa.json";
const LOJA_KEY: &str = "loja_id";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// File-backed session store.
pub struct SessionStore {
    dir: PathBuf,
    headers: HeaderCell,
}

impl SessionStore {
    /// Open (or create) the store directory and synchronize the header cell
    /// with whatever session survives on disk, so a cold start talks to the
    /// backend with the recovered credential.
    pub fn open(dir: impl Into<PathBuf>, headers: HeaderCell) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let store = Self { dir, headers };
        let session = store.load();
        store.headers.set_bearer(session.token());
        store.headers.set_loja(store.selected_loja().as_deref());
        Ok(store)
    }

    /// Handle to the outbound header cell this store synchronizes.
    pub fn headers(&self) -> &HeaderCell {
        &self.headers
    }

    /// Reconstruct the session from disk. Fails closed: a missing or
    /// malformed credential or profile yields the empty session, never a
    /// partially populated one.
    pub fn load(&self) -> Session {
        let token = self.read_string(TOKEN_KEY);
        let user = self.read_json::<UserProfile>(USER_KEY);

        let (token, user) = match (token, user) {
            (Some(t), Some(u)) => (t, u),
            (None, None) => return Session::empty(),
            _ => {
                warn!("durable session is incomplete, discarding");
                return Session::empty();
            }
        };

        // A stale tenant record is recoverable on its own; only the pair
        // above forces the empty session.
        let tenant = self.read_json::<Tenant>(TENANT_KEY);

        Session::authenticated(token, user, tenant)
    }

    /// Persist the session. Writes credential, then profile, then tenant;
    /// an unauthenticated session cannot be half-persisted, so it degrades
    /// to `clear()`.
    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        let (token, user) = match (session.token(), session.user()) {
            (Some(t), Some(u)) => (t, u),
            _ => {
                warn!("save of unauthenticated session, clearing instead");
                return self.clear();
            }
        };

        self.write_atomic(TOKEN_KEY, token.as_bytes())?;
        self.write_atomic(USER_KEY, serde_json::to_vec(user)?.as_slice())?;
        match session.tenant() {
            Some(tenant) => {
                self.write_atomic(TENANT_KEY, serde_json::to_vec(tenant)?.as_slice())?
            }
            None => self.remove(TENANT_KEY)?,
        }

        self.headers.set_bearer(Some(token));
        debug!("session persisted for user {}", user.id);
        Ok(())
    }

    /// Remove all four durable keys and reset the header cell. Idempotent.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.remove(TOKEN_KEY)?;
        self.remove(USER_KEY)?;
        self.remove(TENANT_KEY)?;
        self.remove(LOJA_KEY)?;
        self.headers.clear();
        debug!("durable session cleared");
        Ok(())
    }

    /// Remembered active store id, if any.
    pub fn selected_loja(&self) -> Option<String> {
        self.read_string(LOJA_KEY)
    }

    /// Remember (or forget) the active store id and mirror it into the
    /// `X-Loja-Id` header.
    pub fn set_selected_loja(&self, loja_id: Option<&str>) -> Result<(), StoreError> {
        match loja_id {
            Some(id) => self.write_atomic(LOJA_KEY, id.as_bytes())?,
            None => self.remove(LOJA_KEY)?,
        }
        self.headers.set_loja(loja_id);
        Ok(())
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn read_string(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(s) => {
                let s = s.trim().to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(s)
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("failed to read {}: {}", key, e);
                None
            }
        }
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_string(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("malformed {}: {}", key, e);
                None
            }
        }
    }

    fn write_atomic(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.key_path(key);
        let temp = path.with_extension("tmp");
        fs::write(&temp, data)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(test)]
    fn key_exists(&self, key: &str) -> bool {
        self.key_path(key).exists()
    }
}

impl SessionStore {
    #[cfg(test)]
    pub(crate) fn corrupt_key_for_test(&self, key: &str) {
        fs::write(self.key_path(key), b"{not json").unwrap();
    }
}
