//! Persistent session/context store backed by SQLite. Runs on a
//! dedicated worker thread communicating over an `mpsc` command channel
//! since `rusqlite::Connection` is not `Send`/`Sync`.
//!
//! Table layout:
//! `sessions(id, created_at, last_active_at, owner, channel, metadata_json)`,
//! `contexts(session_id, history_json, updated_at)`,
//! `agent_log(id, session_id, agent, transcript, response, latency_ms, ts)`.
//! A Postgres-backed equivalent is a drop-in following the same
//! `SessionStore` contract (e.g. via `deadpool_postgres`); this crate
//! ships the SQLite path as the reference persistent backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::{ConversationContext, Session, SessionStore};
use crate::error::SwitchboardError;

type Reply<T> = oneshot::Sender<Result<T, String>>;

enum Command {
    GetOrCreateSession { id: Uuid, owner: String, channel: String, reply: Reply<Session> },
    GetContext { id: Uuid, reply: Reply<ConversationContext> },
    SaveContext { id: Uuid, context: ConversationContext, reply: Reply<()> },
    LogExecution { id: Uuid, agent: String, transcript: String, response: String, latency_ms: u64, reply: Reply<()> },
    SessionCount { reply: Reply<usize> },
}

fn worker(path: String, mut receiver: mpsc::Receiver<Command>) {
    let conn = match Connection::open_with_flags(
        &path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    ) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, path, "session store: failed to open sqlite database");
            return;
        }
    };

    if let Err(e) = conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS sessions (
             id TEXT PRIMARY KEY,
             created_at TEXT NOT NULL,
             last_active_at TEXT NOT NULL,
             owner TEXT NOT NULL,
             channel TEXT NOT NULL,
             metadata_json TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS contexts (
             session_id TEXT PRIMARY KEY,
             history_json TEXT NOT NULL,
             updated_at TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS agent_log (
             id TEXT PRIMARY KEY,
             session_id TEXT NOT NULL,
             agent TEXT NOT NULL,
             transcript TEXT NOT NULL,
             response TEXT NOT NULL,
             latency_ms INTEGER NOT NULL,
             ts TEXT NOT NULL
         );",
    ) {
        tracing::error!(error = %e, "session store: schema setup failed");
        return;
    }

    while let Some(cmd) = receiver.blocking_recv() {
        match cmd {
            Command::GetOrCreateSession { id, owner, channel, reply } => {
                let result = do_get_or_create_session(&conn, id, &owner, &channel);
                let _ = reply.send(result);
            }
            Command::GetContext { id, reply } => {
                let result = do_get_context(&conn, id);
                let _ = reply.send(result);
            }
            Command::SaveContext { id, context, reply } => {
                let result = do_save_context(&conn, id, context);
                let _ = reply.send(result);
            }
            Command::LogExecution { id, agent, transcript, response, latency_ms, reply } => {
                let result = do_log_execution(&conn, id, &agent, &transcript, &response, latency_ms);
                let _ = reply.send(result);
            }
            Command::SessionCount { reply } => {
                let result = conn
                    .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get::<_, i64>(0))
                    .map(|n| n as usize)
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
        }
    }
}

fn do_get_or_create_session(conn: &Connection, id: Uuid, owner: &str, channel: &str) -> Result<Session, String> {
    let id_str = id.to_string();
    let existing = conn
        .query_row(
            "SELECT created_at, last_active_at, owner, channel, metadata_json FROM sessions WHERE id = ?1",
            params![id_str],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .ok();

    if let Some((created_at, _last_active, owner, channel, metadata_json)) = existing {
        let now = Utc::now();
        conn.execute(
            "UPDATE sessions SET last_active_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), id_str],
        )
        .map_err(|e| e.to_string())?;
        let metadata: HashMap<String, String> = serde_json::from_str(&metadata_json).unwrap_or_default();
        return Ok(Session {
            id,
            created_at: created_at.parse().map_err(|e: chrono::ParseError| e.to_string())?,
            last_active_at: now,
            owner,
            channel,
            metadata,
        });
    }

    let session = Session::new(id, owner, channel);
    conn.execute(
        "INSERT INTO sessions (id, created_at, last_active_at, owner, channel, metadata_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id_str,
            session.created_at.to_rfc3339(),
            session.last_active_at.to_rfc3339(),
            session.owner,
            session.channel,
            json!(session.metadata).to_string(),
        ],
    )
    .map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT OR IGNORE INTO contexts (session_id, history_json, updated_at) VALUES (?1, ?2, ?3)",
        params![id_str, "[]", Utc::now().to_rfc3339()],
    )
    .map_err(|e| e.to_string())?;
    Ok(session)
}

fn do_get_context(conn: &Connection, id: Uuid) -> Result<ConversationContext, String> {
    let id_str = id.to_string();
    let (history_json, updated_at) = conn
        .query_row(
            "SELECT history_json, updated_at FROM contexts WHERE session_id = ?1",
            params![id_str],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .map_err(|e| format!("no context for session {id}: {e}"))?;

    let history = serde_json::from_str(&history_json).map_err(|e| e.to_string())?;
    Ok(ConversationContext {
        session_id: id,
        history,
        created_at: updated_at.parse().map_err(|e: chrono::ParseError| e.to_string())?,
        last_active_at: Utc::now(),
        metadata: HashMap::new(),
    })
}

fn do_save_context(conn: &Connection, id: Uuid, context: ConversationContext) -> Result<(), String> {
    let history_json = serde_json::to_string(&context.history).map_err(|e| e.to_string())?;
    let now = Utc::now();
    conn.execute(
        "INSERT INTO contexts (session_id, history_json, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(session_id) DO UPDATE SET history_json = excluded.history_json, updated_at = excluded.updated_at",
        params![id.to_string(), history_json, now.to_rfc3339()],
    )
    .map_err(|e| e.to_string())?;
    conn.execute(
        "UPDATE sessions SET last_active_at = ?1 WHERE id = ?2",
        params![now.to_rfc3339(), id.to_string()],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

fn do_log_execution(
    conn: &Connection,
    id: Uuid,
    agent: &str,
    transcript: &str,
    response: &str,
    latency_ms: u64,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO agent_log (id, session_id, agent, transcript, response, latency_ms, ts) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            Uuid::new_v4().to_string(),
            id.to_string(),
            agent,
            transcript,
            response,
            latency_ms as i64,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

/// SQLite-backed `SessionStore`. Opens a dedicated worker thread at
/// construction; all queries are dispatched to it over a bounded
/// channel and awaited via `oneshot`.
pub struct SqlSessionStore {
    sender: mpsc::Sender<Command>,
    _worker: std::thread::JoinHandle<()>,
}

impl SqlSessionStore {
    pub fn open(path: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let path = path.into();
        let handle = std::thread::spawn(move || worker(path, rx));
        Self { sender: tx, _worker: handle }
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, SwitchboardError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| SwitchboardError::DependencyUnavailable("session store worker gone".to_string()))?;
        rx.await
            .map_err(|_| SwitchboardError::DependencyUnavailable("session store worker dropped reply".to_string()))?
            .map_err(SwitchboardError::Internal)
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn get_or_create_session(&self, id: Uuid, owner: &str, channel: &str) -> Result<Session, SwitchboardError> {
        let owner = owner.to_string();
        let channel = channel.to_string();
        self.call(|reply| Command::GetOrCreateSession { id, owner, channel, reply }).await
    }

    async fn get_context(&self, id: Uuid) -> Result<ConversationContext, SwitchboardError> {
        self.call(|reply| Command::GetContext { id, reply }).await
    }

    async fn save_context(&self, id: Uuid, context: ConversationContext) -> Result<(), SwitchboardError> {
        self.call(|reply| Command::SaveContext { id, context, reply }).await
    }

    async fn log_execution(
        &self,
        id: Uuid,
        agent: &str,
        transcript: &str,
        response: &str,
        latency_ms: u64,
    ) -> Result<(), SwitchboardError> {
        let agent = agent.to_string();
        let transcript = transcript.to_string();
        let response = response.to_string();
        self.call(|reply| Command::LogExecution { id, agent, transcript, response, latency_ms, reply }).await
    }

    async fn session_count(&self) -> usize {
        self.call(|reply| Command::SessionCount { reply }).await.unwrap_or(0)
    }
}
