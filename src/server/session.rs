// Session management
// Maps relay session ids to their upstream conversation state

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::{RelayError, RelayResult};
use crate::nebula::Conversation;

/// One logical conversation held by the relay
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Unix millis of the last request that touched this session
    last_active_ms: AtomicI64,
    /// Held for the whole exchange, so turns on one session never overlap
    conversation: Arc<Mutex<Conversation>>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            conversation: Arc::new(Mutex::new(Conversation::new(id.clone()))),
            id,
            created_at: now,
            last_active_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn conversation(&self) -> Arc<Mutex<Conversation>> {
        Arc::clone(&self.conversation)
    }

    pub fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// True while an exchange holds the conversation
    pub fn is_busy(&self) -> bool {
        self.conversation.try_lock().is_err()
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.last_active_ms.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    max_sessions: usize,
    /// Idle timeout in minutes; 0 keeps sessions for the life of the process
    timeout_minutes: u64,
}

impl SessionManager {
    /// At most `max_sessions` are kept; when full, the least recently active
    /// idle session makes room for a new one.
    pub fn new(max_sessions: usize, timeout_minutes: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
            timeout_minutes,
        }
    }

    /// Look up `id`, or create a session under it (a fresh UUID when `None`)
    pub fn get_or_create(&self, id: Option<&str>) -> RelayResult<Arc<Session>> {
        if let Some(id) = id {
            if let Some(session) = self.sessions.get(id) {
                session.touch();
                return Ok(Arc::clone(&session));
            }
        }

        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.insert(id)
    }

    /// Always mint a new session with a fresh id
    pub fn create(&self) -> RelayResult<Arc<Session>> {
        self.insert(Uuid::new_v4().to_string())
    }

    fn insert(&self, id: String) -> RelayResult<Arc<Session>> {
        if self.sessions.len() >= self.max_sessions {
            self.purge_expired();
        }
        if self.sessions.len() >= self.max_sessions && !self.evict_least_recent() {
            return Err(RelayError::SessionLimit(self.max_sessions));
        }

        let session = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Session::new(id.clone())))
            .clone();

        tracing::info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    /// Drop the least recently active idle session; false when every session is mid-exchange
    fn evict_least_recent(&self) -> bool {
        let victim = self
            .sessions
            .iter()
            .filter(|entry| !entry.value().is_busy())
            .min_by_key(|entry| entry.value().last_active_ms.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        match victim {
            Some(id) => {
                self.sessions.remove(&id);
                tracing::info!(session_id = %id, "Session evicted to make room");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| Arc::clone(&s))
    }

    pub fn delete(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions idle longer than the timeout; returns how many went.
    /// Sessions mid-exchange are kept regardless of age.
    pub fn purge_expired(&self) -> usize {
        if self.timeout_minutes == 0 {
            return 0;
        }

        let cutoff = Utc::now() - chrono::Duration::minutes(self.timeout_minutes as i64);
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_active() > cutoff || session.is_busy());
        let purged = before.saturating_sub(self.sessions.len());

        if purged > 0 {
            tracing::info!(purged = purged, "Expired idle sessions");
        }
        purged
    }

    pub fn timeout_minutes(&self) -> u64 {
        self.timeout_minutes
    }
}
