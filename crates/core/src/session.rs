use crate::ConversationState;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Conversation history keyed by an opaque session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Option<ConversationState>;

    async fn save(&self, session_id: &str, state: ConversationState);

    /// Returns whether a session was removed.
    async fn clear(&self, session_id: &str) -> bool;
}

#[derive(Debug, Clone)]
struct SessionEntry {
    state: ConversationState,
    last_touched: DateTime<Utc>,
}

/// Process-local sessions with an idle time-to-live. A session that has not
/// been loaded or saved for `ttl` is dropped on the next access.
#[derive(Debug)]
pub struct InMemorySessionStore {
    ttl: ChronoDuration,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn expired(&self, entry: &SessionEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.last_touched) >= self.ttl
    }

    /// Drops every session idle at `now`; returns how many were removed.
    pub async fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !self.expired(entry, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, "expired sessions evicted");
        }
        evicted
    }

    pub async fn load_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<ConversationState> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(session_id)?;
        if self.expired(entry, now) {
            sessions.remove(session_id);
            debug!(session_id, "session expired");
            return None;
        }
        entry.last_touched = now;
        Some(entry.state.clone())
    }

    pub async fn save_at(&self, session_id: &str, state: ConversationState, now: DateTime<Utc>) {
        self.sessions.write().await.insert(
            session_id.to_string(),
            SessionEntry {
                state,
                last_touched: now,
            },
        );
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Option<ConversationState> {
        let now = Utc::now();
        self.evict_expired_at(now).await;
        self.load_at(session_id, now).await
    }

    async fn save(&self, session_id: &str, state: ConversationState) {
        self.save_at(session_id, state, Utc::now()).await;
    }

    async fn clear(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }
}
