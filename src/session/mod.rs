//! Context & session store: per-session history, TTL, and eviction
//! behind a pluggable `SessionStore` trait with two shipped backends —
//! `memory::InMemorySessionStore` (default) and `sql::SqlSessionStore`
//! (rusqlite / Postgres).

pub mod memory;
pub mod sql;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SwitchboardError;

/// Lifecycle state of a `Session`: `New → Active → Idle →
/// Expired`. Any interaction in `New`/`Idle` moves to `Active`; no
/// interaction for the idle threshold moves to `Idle` (still resident,
/// eligible for eviction); no interaction past the hard TTL moves to
/// `Expired` and the session is removed on next access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    New,
    Active,
    Idle,
    Expired,
}

/// A session's identity and bookkeeping. One session owns
/// exactly one `ConversationContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub owner: String,
    pub channel: String,
    pub metadata: HashMap<String, String>,
}

impl Session {
    pub fn new(id: Uuid, owner: impl Into<String>, channel: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_active_at: now,
            owner: owner.into(),
            channel: channel.into(),
            metadata: HashMap::new(),
        }
    }

    /// State derived from elapsed time since `last_active_at`, relative
    /// to the configured `idle_after`/`hard_ttl` thresholds. See
    /// DESIGN.md for the idle-vs-hard-TTL split this system uses.
    pub fn state(&self, idle_after: Duration, hard_ttl: Duration) -> SessionState {
        let elapsed = (Utc::now() - self.last_active_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed >= hard_ttl {
            SessionState::Expired
        } else if elapsed >= idle_after {
            SessionState::Idle
        } else if self.created_at == self.last_active_at {
            SessionState::New
        } else {
            SessionState::Active
        }
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}

/// One turn of conversation history.
pub type HistoryTurn = (String, String);

/// Per-session conversation history. History length is
/// capped at `max_turns`; overflow is handled by the `OverflowPolicy`
/// the store was constructed with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: Uuid,
    pub history: Vec<HistoryTurn>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl ConversationContext {
    pub fn new(session_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            history: Vec::new(),
            created_at: now,
            last_active_at: now,
            metadata: HashMap::new(),
        }
    }
}

/// How a `ConversationContext` sheds history once it exceeds
/// `context_max_turns`: drop the oldest turn outright, or replace it
/// with a one-line summary. `SummarizeOldest` is the default whenever a
/// `summarizer` agent is registered (DESIGN.md Open Question decision);
/// otherwise `DropOldest`.
pub enum OverflowPolicy {
    DropOldest,
    SummarizeOldest(Box<dyn Fn(&HistoryTurn) -> String + Send + Sync>),
}

impl OverflowPolicy {
    fn apply(&self, history: &mut Vec<HistoryTurn>, max_turns: usize) {
        while history.len() > max_turns {
            match self {
                OverflowPolicy::DropOldest => {
                    history.remove(0);
                }
                OverflowPolicy::SummarizeOldest(summarize) => {
                    let oldest = history.remove(0);
                    let summary = summarize(&oldest);
                    if let Some(next) = history.first_mut() {
                        next.0 = format!("[summary] {summary}\n{}", next.0);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowPolicy::DropOldest => write!(f, "OverflowPolicy::DropOldest"),
            OverflowPolicy::SummarizeOldest(_) => write!(f, "OverflowPolicy::SummarizeOldest(..)"),
        }
    }
}

/// Pluggable session/context backend. Both shipped implementations
/// preserve: exactly one context per session id; concurrent reads
/// allowed; writes serialized per session; `last_active_at` updated on
/// every mutation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_or_create_session(&self, id: Uuid, owner: &str, channel: &str) -> Result<Session, SwitchboardError>;
    async fn get_context(&self, id: Uuid) -> Result<ConversationContext, SwitchboardError>;
    async fn save_context(&self, id: Uuid, context: ConversationContext) -> Result<(), SwitchboardError>;
    async fn log_execution(
        &self,
        id: Uuid,
        agent: &str,
        transcript: &str,
        response: &str,
        latency_ms: u64,
    ) -> Result<(), SwitchboardError>;
    async fn session_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_state_is_new() {
        let session = Session::new(Uuid::new_v4(), "user-1", "channel-1");
        assert_eq!(session.state(Duration::from_secs(1800), Duration::from_secs(3600)), SessionState::New);
    }

    #[test]
    fn touched_session_becomes_active() {
        let mut session = Session::new(Uuid::new_v4(), "user-1", "channel-1");
        session.created_at -= chrono::Duration::seconds(5);
        session.touch();
        assert_eq!(session.state(Duration::from_secs(1800), Duration::from_secs(3600)), SessionState::Active);
    }

    #[test]
    fn drop_oldest_trims_to_max_turns() {
        let mut history = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
            ("c".to_string(), "3".to_string()),
        ];
        OverflowPolicy::DropOldest.apply(&mut history, 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].0, "b");
    }
}
