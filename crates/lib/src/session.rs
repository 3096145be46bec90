//! Ephemeral per-conversation sessions with TTL expiry.
//!
//! Sessions are keyed by id. Expiry is evaluated lazily on lookup; a
//! periodic sweep is a hygiene option, not a correctness requirement.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default session lifetime when the caller does not pass a TTL.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// One logical conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Stable across reconnects for the same caller, when the channel
    /// provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// None = never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Session {
    fn expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }
}

/// In-memory session store (create, get, end, sweep).
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a session with a generated id. `ttl` None uses the default
    /// 24h; pass `Some(None)` via [`SessionStore::create_with_expiry`] for a
    /// session that never expires.
    pub async fn create(
        &self,
        client_id: Option<String>,
        channel_id: Option<String>,
        ttl_secs: Option<i64>,
    ) -> Session {
        let ttl = ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS);
        self.create_with_expiry(client_id, channel_id, Some(Duration::seconds(ttl)))
            .await
    }

    /// Create a session with an explicit expiry duration (None = never expires).
    pub async fn create_with_expiry(
        &self,
        client_id: Option<String>,
        channel_id: Option<String>,
        ttl: Option<Duration>,
    ) -> Session {
        let now = Utc::now();
        let session = Session {
            id: format!("sess-{}", uuid::Uuid::new_v4()),
            client_id,
            channel_id,
            created_at: now,
            last_activity: now,
            expires_at: ttl.map(|d| now + d),
            authenticated: false,
            metadata: Map::new(),
        };
        self.inner
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Look up a session. Returns None (and removes the entry) when expired;
    /// otherwise touches `last_activity` and returns a clone.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let now = Utc::now();
        let mut g = self.inner.write().await;
        match g.get_mut(id) {
            Some(s) if s.expired_at(now) => {
                g.remove(id);
                None
            }
            Some(s) => {
                s.last_activity = now;
                Some(s.clone())
            }
            None => None,
        }
    }

    /// Remove a session unconditionally (e.g. channel disconnect).
    pub async fn end(&self, id: &str) {
        self.inner.write().await.remove(id);
    }

    /// Remove all expired sessions; returns how many were dropped.
    /// Optional hygiene pass; nothing schedules this by default.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut g = self.inner.write().await;
        let before = g.len();
        g.retain(|_, s| !s.expired_at(now));
        before - g.len()
    }

    /// Set the caller identity once the channel learns it (e.g. from the
    /// first client frame). No-op on unknown id.
    pub async fn set_client_id(&self, id: &str, client_id: impl Into<String>) {
        if let Some(s) = self.inner.write().await.get_mut(id) {
            s.client_id = Some(client_id.into());
        }
    }

    /// Mark a session authenticated (or not). No-op on unknown id.
    pub async fn set_authenticated(&self, id: &str, authenticated: bool) {
        if let Some(s) = self.inner.write().await.get_mut(id) {
            s.authenticated = authenticated;
        }
    }

    /// Attach metadata to a session. No-op on unknown id.
    pub async fn set_metadata(&self, id: &str, key: impl Into<String>, value: Value) {
        if let Some(s) = self.inner.write().await.get_mut(id) {
            s.metadata.insert(key.into(), value);
        }
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}
