//! Default in-memory session/context store: a `dashmap`-backed,
//! insertion-ordered map with LRU eviction at capacity and TTL eviction
//! checked on every access.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{ConversationContext, OverflowPolicy, Session, SessionState, SessionStore};
use crate::error::SwitchboardError;

struct Entry {
    session: Session,
    context: ConversationContext,
}

/// Default single-node backend. Per-session mutation is serialized by
/// a `parking_lot::Mutex` wrapping the whole entry map's insertion
/// counter plus the `dashmap` shard lock for the entry itself, so reads
/// of distinct sessions never contend.
pub struct InMemorySessionStore {
    entries: DashMap<Uuid, Mutex<Entry>>,
    max_sessions: usize,
    ttl: Duration,
    idle_after: Duration,
    overflow: OverflowPolicy,
    context_max_turns: usize,
}

impl InMemorySessionStore {
    pub fn new(max_sessions: usize, ttl: Duration, context_max_turns: usize, overflow: OverflowPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            max_sessions,
            ttl,
            idle_after: ttl / 2,
            overflow,
            context_max_turns,
        }
    }

    /// Evict sessions whose hard TTL has elapsed, then — if still over
    /// capacity — evict the least-recently-active session (LRU).
    fn evict_expired_and_over_capacity(&self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| {
            let last_active = entry.lock().session.last_active_at;
            (now - last_active).to_std().unwrap_or(Duration::ZERO) < self.ttl
        });

        while self.entries.len() > self.max_sessions {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().lock().session.last_active_at)
                .map(|e| *e.key());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Current lifecycle state of a session, or `None` if it isn't
    /// resident. Exposed for the control plane's readiness/metrics view.
    pub fn state(&self, id: Uuid) -> Option<SessionState> {
        self.entries
            .get(&id)
            .map(|entry| entry.lock().session.state(self.idle_after, self.ttl))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create_session(&self, id: Uuid, owner: &str, channel: &str) -> Result<Session, SwitchboardError> {
        self.evict_expired_and_over_capacity();

        if let Some(entry) = self.entries.get(&id) {
            let mut guard = entry.lock();
            guard.session.touch();
            return Ok(guard.session.clone());
        }

        let session = Session::new(id, owner, channel);
        let context = ConversationContext::new(id);
        self.entries.insert(
            id,
            Mutex::new(Entry {
                session: session.clone(),
                context,
            }),
        );
        Ok(session)
    }

    async fn get_context(&self, id: Uuid) -> Result<ConversationContext, SwitchboardError> {
        self.entries
            .get(&id)
            .map(|entry| entry.lock().context.clone())
            .ok_or_else(|| SwitchboardError::Internal(format!("no session for id {id}")))
    }

    async fn save_context(&self, id: Uuid, mut context: ConversationContext) -> Result<(), SwitchboardError> {
        self.overflow.apply(&mut context.history, self.context_max_turns);
        context.last_active_at = Utc::now();

        let entry = self
            .entries
            .get(&id)
            .ok_or_else(|| SwitchboardError::Internal(format!("no session for id {id}")))?;
        let mut guard = entry.lock();
        guard.context = context;
        guard.session.touch();
        Ok(())
    }

    async fn log_execution(
        &self,
        id: Uuid,
        _agent: &str,
        transcript: &str,
        response: &str,
        _latency_ms: u64,
    ) -> Result<(), SwitchboardError> {
        let mut context = self.get_context(id).await?;
        context.history.push((transcript.to_string(), response.to_string()));
        self.save_context(id, context).await
    }

    async fn session_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max: usize, turns: usize) -> InMemorySessionStore {
        InMemorySessionStore::new(max, Duration::from_secs(3600), turns, OverflowPolicy::DropOldest)
    }

    #[tokio::test]
    async fn creates_one_context_per_session() {
        let store = store(10, 20);
        let id = Uuid::new_v4();
        store.get_or_create_session(id, "u1", "c1").await.unwrap();
        store.get_or_create_session(id, "u1", "c1").await.unwrap();
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn history_is_capped_at_max_turns() {
        let store = store(10, 2);
        let id = Uuid::new_v4();
        store.get_or_create_session(id, "u1", "c1").await.unwrap();
        for i in 0..5 {
            store
                .log_execution(id, "echo", &format!("msg-{i}"), &format!("resp-{i}"), 10)
                .await
                .unwrap();
        }
        let ctx = store.get_context(id).await.unwrap();
        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.history.last().unwrap().0, "msg-4");
    }

    #[tokio::test]
    async fn lru_eviction_at_capacity() {
        let store = store(2, 20);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        store.get_or_create_session(a, "u", "c").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.get_or_create_session(b, "u", "c").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.get_or_create_session(c, "u", "c").await.unwrap();
        assert_eq!(store.session_count().await, 2);
        assert!(store.get_context(a).await.is_err());
    }

    #[tokio::test]
    async fn touching_updates_last_active() {
        let store = store(10, 20);
        let id = Uuid::new_v4();
        let first = store.get_or_create_session(id, "u", "c").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = store.get_or_create_session(id, "u", "c").await.unwrap();
        assert!(second.last_active_at > first.last_active_at);
    }
}
