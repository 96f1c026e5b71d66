//! Advisory identity cache shared by UI code.
//!
//! The real authentication artifact is an opaque cookie managed by the
//! transport. This cache only remembers who the UI believes is logged in, so a
//! stale value is harmless: the server remains the authority.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Cached identity of the logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Backend user id
    pub user_id: String,
    /// Role name as reported by the backend (e.g. `customer`, `seller`, `admin`)
    pub role: String,
}

impl Identity {
    /// Creates an identity
    #[must_use]
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }
}

/// Session cache interface injected into the client.
///
/// Writes replace the whole identity so readers never observe a half-updated
/// value. Concurrent writers resolve as last-write-wins.
pub trait SessionStore: Send + Sync {
    /// Returns the cached identity, if any
    fn identity(&self) -> Option<Identity>;

    /// Replaces the cached identity
    fn set_cached_identity(&self, identity: Identity);

    /// Forgets the cached identity
    fn clear(&self);

    /// Returns the cached user id, if any
    fn cached_user_id(&self) -> Option<String> {
        self.identity().map(|i| i.user_id)
    }
}

/// Process-local [`SessionStore`] backed by a lock
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    current: RwLock<Option<Identity>>,
}

impl InMemorySessionStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn identity(&self) -> Option<Identity> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_cached_identity(&self, identity: Identity) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(identity);
    }

    fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
