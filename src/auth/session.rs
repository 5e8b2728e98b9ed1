//! Per-user session capability
//!
//! The handshake spans two requests: the one that starts it and the callback
//! that finishes it. Everything that must survive the redirect lives in a
//! [`SessionStore`] that the host supplies for the current user. The store
//! needs read-your-writes consistency for a single session, nothing more.

use std::collections::HashMap;

use crate::auth::discovery::EndpointSet;
use crate::error::{IndieAuthError, Result};

/// Session key holding the JSON-encoded [`EndpointSet`] for the handshake.
pub const ENDPOINTS_SESSION_KEY: &str = "indieauth.endpoints";

/// String key/value storage scoped to one user session.
pub trait SessionStore: Send {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: String);

    /// Deletes `key`, returning the previous value.
    fn remove(&mut self, key: &str) -> Option<String>;
}

/// In-memory [`SessionStore`].
///
/// # Examples
///
/// ```
/// use indieauth_client::auth::session::{MemorySession, SessionStore};
///
/// let mut session = MemorySession::default();
/// session.set("k", "v".to_string());
/// assert_eq!(session.remove("k").as_deref(), Some("v"));
/// assert!(session.get("k").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    values: HashMap<String, String>,
}

impl MemorySession {
    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }
}

/// Caches the discovered endpoints for the callback.
pub(crate) fn store_endpoints(session: &mut dyn SessionStore, endpoints: &EndpointSet) -> Result<()> {
    let encoded = serde_json::to_string(endpoints)?;
    session.set(ENDPOINTS_SESSION_KEY, encoded);
    Ok(())
}

/// Removes and returns the cached endpoints.
///
/// Returns `Ok(None)` when nothing was cached and an error when the cached
/// value cannot be decoded.
pub(crate) fn take_endpoints(session: &mut dyn SessionStore) -> Result<Option<EndpointSet>> {
    let Some(encoded) = session.remove(ENDPOINTS_SESSION_KEY) else {
        return Ok(None);
    };
    let endpoints = serde_json::from_str(&encoded).map_err(|e| {
        IndieAuthError::Session(format!("corrupt endpoint cache: {e}"))
    })?;
    Ok(Some(endpoints))
}
