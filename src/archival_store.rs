use crate::domain::{Message, Role, SessionMeta, SessionStatus};
use crate::error::CoreError;
use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable home for sessions once they leave the live session store on
/// close. The source keeps this in MongoDB; no Mongo driver exists anywhere
/// in this crate's retrieved dependency corpus, so closed sessions land in
/// the same Postgres pool used for relational order data instead (see
/// DESIGN.md).
#[async_trait]
pub trait ArchivalStore: Send + Sync {
    async fn archive_session(
        &self,
        meta: &SessionMeta,
        messages: &[Message],
        metadata: Option<serde_json::Value>,
    ) -> Result<(), CoreError>;
    async fn list_closed_sessions(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<SessionMeta>, CoreError>;
    async fn get_closed_session(&self, sid: &str) -> Result<Option<SessionMeta>, CoreError>;
    async fn get_archived_messages(
        &self,
        sid: &str,
        limit: Option<i64>,
        cursor: Option<i64>,
    ) -> Result<(Vec<Message>, Option<i64>), CoreError>;
}

pub struct PostgresArchivalStore {
    pool: Pool<Postgres>,
}

impl PostgresArchivalStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn init_schema(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS archived_sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                closed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                message_count INT NOT NULL DEFAULT 0,
                summary TEXT,
                first_name TEXT,
                last_name TEXT,
                metadata JSONB
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_archived_sessions_user ON archived_sessions(user_id)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS archived_messages (
                id BIGSERIAL PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES archived_sessions(session_id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_archived_messages_session ON archived_messages(session_id, id)")
            .execute(pool)
            .await?;

        Ok(())
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Agent => "agent",
    }
}

fn role_from_str(s: &str) -> Role {
    match s {
        "assistant" => Role::Assistant,
        "agent" => Role::Agent,
        _ => Role::User,
    }
}

#[async_trait]
impl ArchivalStore for PostgresArchivalStore {
    async fn archive_session(
        &self,
        meta: &SessionMeta,
        messages: &[Message],
        metadata: Option<serde_json::Value>,
    ) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO archived_sessions
                (session_id, user_id, status, created_at, message_count, summary, first_name, last_name, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (session_id) DO UPDATE SET
                status = EXCLUDED.status,
                message_count = EXCLUDED.message_count,
                summary = EXCLUDED.summary,
                metadata = EXCLUDED.metadata,
                closed_at = NOW()
            "#,
        )
        .bind(&meta.session_id)
        .bind(&meta.user_id)
        .bind("closed")
        .bind(meta.created_at)
        .bind(meta.message_count as i32)
        .bind(&meta.summary)
        .bind(&meta.first_name)
        .bind(&meta.last_name)
        .bind(&metadata)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        for msg in messages {
            sqlx::query(
                "INSERT INTO archived_messages (session_id, role, content, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(&meta.session_id)
            .bind(role_str(msg.role))
            .bind(&msg.content)
            .bind(msg.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| CoreError::SessionStoreFailure(e.to_string()))
    }

    async fn list_closed_sessions(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<SessionMeta>, CoreError> {
        let rows = sqlx::query(
            "SELECT session_id, user_id, status, created_at, closed_at, message_count, summary, first_name, last_name \
             FROM archived_sessions WHERE user_id = $1 ORDER BY closed_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit.unwrap_or(100))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        Ok(rows.iter().map(row_to_meta).collect())
    }

    async fn get_closed_session(&self, sid: &str) -> Result<Option<SessionMeta>, CoreError> {
        let row = sqlx::query(
            "SELECT session_id, user_id, status, created_at, closed_at, message_count, summary, first_name, last_name \
             FROM archived_sessions WHERE session_id = $1",
        )
        .bind(sid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        Ok(row.as_ref().map(row_to_meta))
    }

    async fn get_archived_messages(
        &self,
        sid: &str,
        limit: Option<i64>,
        cursor: Option<i64>,
    ) -> Result<(Vec<Message>, Option<i64>), CoreError> {
        let limit = limit.unwrap_or(50).max(1);
        let after_id = cursor.unwrap_or(0);

        let rows = sqlx::query(
            "SELECT id, role, content, created_at FROM archived_messages \
             WHERE session_id = $1 AND id > $2 ORDER BY id ASC LIMIT $3",
        )
        .bind(sid)
        .bind(after_id)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        let mut messages: Vec<Message> = rows
            .iter()
            .take(limit as usize)
            .map(|r| Message {
                role: role_from_str(r.get::<String, _>("role").as_str()),
                content: r.get("content"),
                created_at: r.get("created_at"),
            })
            .collect();

        let next_cursor = if rows.len() as i64 > limit {
            rows.get(limit as usize - 1).map(|r| r.get::<i64, _>("id"))
        } else {
            None
        };

        messages.truncate(limit as usize);
        Ok((messages, next_cursor))
    }
}

fn row_to_meta(r: &sqlx::postgres::PgRow) -> SessionMeta {
    SessionMeta {
        session_id: r.get("session_id"),
        user_id: r.get("user_id"),
        status: SessionStatus::Closed,
        created_at: r.get("created_at"),
        last_updated: r.get("closed_at"),
        message_count: r.get::<i32, _>("message_count") as u32,
        summary: r.get("summary"),
        summary_message_count: 0,
        first_name: r.get("first_name"),
        last_name: r.get("last_name"),
        greeting_sent: true,
        agent_id: None,
        escalated_at: None,
        escalation_reason: None,
        claimed_at: None,
        last_agent_message_at: None,
    }
}

/// In-memory fake for tests.
#[derive(Default)]
pub struct InMemoryArchivalStore {
    sessions: Mutex<HashMap<String, (SessionMeta, Vec<Message>)>>,
}

#[async_trait]
impl ArchivalStore for InMemoryArchivalStore {
    async fn archive_session(
        &self,
        meta: &SessionMeta,
        messages: &[Message],
        _metadata: Option<serde_json::Value>,
    ) -> Result<(), CoreError> {
        let mut closed = meta.clone();
        closed.status = SessionStatus::Closed;
        self.sessions
            .lock()
            .unwrap()
            .insert(meta.session_id.clone(), (closed, messages.to_vec()));
        Ok(())
    }

    async fn list_closed_sessions(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<SessionMeta>, CoreError> {
        let sessions = self.sessions.lock().unwrap();
        let mut metas: Vec<SessionMeta> = sessions
            .values()
            .filter(|(m, _)| m.user_id == user_id)
            .map(|(m, _)| m.clone())
            .collect();
        metas.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        if let Some(limit) = limit {
            metas.truncate(limit as usize);
        }
        Ok(metas)
    }

    async fn get_closed_session(&self, sid: &str) -> Result<Option<SessionMeta>, CoreError> {
        Ok(self.sessions.lock().unwrap().get(sid).map(|(m, _)| m.clone()))
    }

    async fn get_archived_messages(
        &self,
        sid: &str,
        limit: Option<i64>,
        _cursor: Option<i64>,
    ) -> Result<(Vec<Message>, Option<i64>), CoreError> {
        let sessions = self.sessions.lock().unwrap();
        let messages = sessions.get(sid).map(|(_, msgs)| msgs.clone()).unwrap_or_default();
        let limited = match limit {
            Some(n) if (n as usize) < messages.len() => messages[..n as usize].to_vec(),
            _ => messages,
        };
        Ok((limited, None))
    }
}
