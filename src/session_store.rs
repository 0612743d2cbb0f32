use crate::domain::{Message, SessionMeta};
use crate::error::CoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Session metadata, the recent-message buffer, and the user/escalation/agent
/// indices described in §4.1. `append_message` refreshes the TTL on both the
/// meta key and the message buffer in one atomic batch; `recent` always
/// returns chronological order regardless of the underlying storage order.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn read_meta(&self, sid: &str) -> Result<Option<SessionMeta>, CoreError>;
    async fn write_meta(&self, meta: &SessionMeta) -> Result<(), CoreError>;
    async fn register(&self, user_id: &str, sid: &str) -> Result<(), CoreError>;
    async fn unregister(&self, user_id: &str, sid: &str) -> Result<(), CoreError>;
    async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<SessionMeta>, CoreError>;
    async fn append_message(&self, sid: &str, msg: &Message) -> Result<(), CoreError>;
    async fn recent(&self, sid: &str) -> Result<Vec<Message>, CoreError>;
    async fn all_messages(&self, sid: &str, limit: Option<usize>) -> Result<Vec<Message>, CoreError>;
    async fn touch(&self, sid: &str) -> Result<(), CoreError>;
    async fn delete(&self, sid: &str) -> Result<(), CoreError>;
    async fn enqueue_escalation(&self, sid: &str) -> Result<(), CoreError>;
    async fn dequeue_escalation(&self, sid: &str) -> Result<(), CoreError>;
    async fn list_escalations(&self) -> Result<Vec<SessionMeta>, CoreError>;
    async fn assign_agent(&self, sid: &str, agent_id: &str) -> Result<(), CoreError>;
    async fn unassign_agent(&self, sid: &str, agent_id: &str) -> Result<(), CoreError>;
    async fn list_agent_sessions(&self, agent_id: &str) -> Result<Vec<SessionMeta>, CoreError>;
}

/// Redis-backed implementation. Key layout:
/// `session:<sid>` (meta, JSON), `session:<sid>:messages` (LIST, newest
/// first via LPUSH), `user_sessions:<uid>` / `escalations:pending` /
/// `agent_sessions:<agent_id>` (SETs).
pub struct RedisSessionStore {
    conn: ConnectionManager,
    recent_window: usize,
    ttl_seconds: i64,
    timeout: Duration,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, recent_window: usize, ttl_days: i64, timeout: Duration) -> Self {
        let ttl_seconds = ttl_days.saturating_mul(86400);
        Self { conn, recent_window, ttl_seconds: ttl_seconds.max(0), timeout }
    }

    /// Bound every Redis round-trip by the configured `session_store_timeout`
    /// (§5). A timed-out call surfaces as `SessionStoreFailure`, same as any
    /// other Redis error — the session store is the one collaborator whose
    /// failures are NOT swallowed.
    async fn timed<T>(&self, fut: impl std::future::Future<Output = redis::RedisResult<T>>) -> Result<T, CoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CoreError::SessionStoreFailure(e.to_string())),
            Err(_) => Err(CoreError::SessionStoreFailure("timed out".to_string())),
        }
    }

    fn meta_key(sid: &str) -> String {
        format!("session:{}", sid)
    }

    fn messages_key(sid: &str) -> String {
        format!("session:{}:messages", sid)
    }

    fn user_sessions_key(user_id: &str) -> String {
        format!("user_sessions:{}", user_id)
    }

    fn escalations_key() -> String {
        "escalations:pending".to_string()
    }

    fn agent_sessions_key(agent_id: &str) -> String {
        format!("agent_sessions:{}", agent_id)
    }

    async fn read_metas(&self, sids: Vec<String>) -> Result<Vec<SessionMeta>, CoreError> {
        let mut metas = Vec::with_capacity(sids.len());
        for sid in sids {
            if let Some(meta) = self.read_meta(&sid).await? {
                metas.push(meta);
            }
        }
        Ok(metas)
    }

    async fn smembers_sorted(&self, key: &str) -> Result<Vec<String>, CoreError> {
        let mut con = self.conn.clone();
        let mut members: Vec<String> = self.timed(redis::cmd("SMEMBERS").arg(key).query_async(&mut con)).await?;
        members.sort();
        Ok(members)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn read_meta(&self, sid: &str) -> Result<Option<SessionMeta>, CoreError> {
        let mut con = self.conn.clone();
        let raw: Option<String> =
            self.timed(redis::cmd("GET").arg(Self::meta_key(sid)).query_async(&mut con)).await?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| CoreError::SessionStoreFailure(e.to_string())),
            None => Ok(None),
        }
    }

    async fn write_meta(&self, meta: &SessionMeta) -> Result<(), CoreError> {
        let payload = serde_json::to_string(meta).map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        let mut con = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(Self::meta_key(&meta.session_id)).arg(payload);
        if self.ttl_seconds > 0 {
            cmd.arg("EX").arg(self.ttl_seconds);
        }
        self.timed(cmd.query_async::<_, ()>(&mut con)).await
    }

    async fn register(&self, user_id: &str, sid: &str) -> Result<(), CoreError> {
        if user_id.is_empty() {
            return Ok(());
        }
        let mut con = self.conn.clone();
        self.timed(
            redis::cmd("SADD").arg(Self::user_sessions_key(user_id)).arg(sid).query_async::<_, ()>(&mut con),
        )
        .await
    }

    async fn unregister(&self, user_id: &str, sid: &str) -> Result<(), CoreError> {
        if user_id.is_empty() {
            return Ok(());
        }
        let mut con = self.conn.clone();
        self.timed(
            redis::cmd("SREM").arg(Self::user_sessions_key(user_id)).arg(sid).query_async::<_, ()>(&mut con),
        )
        .await
    }

    async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<SessionMeta>, CoreError> {
        let sids = self.smembers_sorted(&Self::user_sessions_key(user_id)).await?;
        self.read_metas(sids).await
    }

    async fn append_message(&self, sid: &str, msg: &Message) -> Result<(), CoreError> {
        let serialized = serde_json::to_string(msg).map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        let messages_key = Self::messages_key(sid);
        let meta_key = Self::meta_key(sid);
        let mut con = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic().cmd("LPUSH").arg(&messages_key).arg(serialized).ignore();
        if self.ttl_seconds > 0 {
            pipe.cmd("EXPIRE").arg(&messages_key).arg(self.ttl_seconds).ignore();
            pipe.cmd("EXPIRE").arg(&meta_key).arg(self.ttl_seconds).ignore();
        }
        self.timed(pipe.query_async::<_, ()>(&mut con)).await
    }

    async fn recent(&self, sid: &str) -> Result<Vec<Message>, CoreError> {
        let end: isize = if self.recent_window > 0 { self.recent_window as isize - 1 } else { -1 };
        let mut con = self.conn.clone();
        let raw_items: Vec<String> = self
            .timed(redis::cmd("LRANGE").arg(Self::messages_key(sid)).arg(0isize).arg(end).query_async(&mut con))
            .await?;

        let mut messages: Vec<Message> = raw_items
            .iter()
            .filter_map(|item| serde_json::from_str(item).ok())
            .collect();
        // LPUSH stores newest first; reverse to chronological order.
        messages.reverse();
        Ok(messages)
    }

    async fn all_messages(&self, sid: &str, limit: Option<usize>) -> Result<Vec<Message>, CoreError> {
        if let Some(0) = limit {
            return Ok(Vec::new());
        }
        let end: isize = match limit {
            Some(n) => n as isize - 1,
            None => -1,
        };
        let mut con = self.conn.clone();
        let raw_items: Vec<String> = self
            .timed(redis::cmd("LRANGE").arg(Self::messages_key(sid)).arg(0isize).arg(end).query_async(&mut con))
            .await?;

        let mut messages: Vec<Message> = raw_items
            .iter()
            .filter_map(|item| serde_json::from_str(item).ok())
            .collect();
        messages.reverse();
        Ok(messages)
    }

    async fn touch(&self, sid: &str) -> Result<(), CoreError> {
        if self.ttl_seconds <= 0 {
            return Ok(());
        }
        let messages_key = Self::messages_key(sid);
        let meta_key = Self::meta_key(sid);
        let mut con = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("EXPIRE").arg(&messages_key).arg(self.ttl_seconds).ignore()
            .cmd("EXPIRE").arg(&meta_key).arg(self.ttl_seconds).ignore();
        self.timed(pipe.query_async::<_, ()>(&mut con)).await
    }

    async fn delete(&self, sid: &str) -> Result<(), CoreError> {
        let mut con = self.conn.clone();
        self.timed(
            redis::cmd("DEL")
                .arg(Self::meta_key(sid))
                .arg(Self::messages_key(sid))
                .query_async::<_, ()>(&mut con),
        )
        .await
    }

    async fn enqueue_escalation(&self, sid: &str) -> Result<(), CoreError> {
        let mut con = self.conn.clone();
        self.timed(redis::cmd("SADD").arg(Self::escalations_key()).arg(sid).query_async::<_, ()>(&mut con)).await
    }

    async fn dequeue_escalation(&self, sid: &str) -> Result<(), CoreError> {
        let mut con = self.conn.clone();
        self.timed(redis::cmd("SREM").arg(Self::escalations_key()).arg(sid).query_async::<_, ()>(&mut con)).await
    }

    async fn list_escalations(&self) -> Result<Vec<SessionMeta>, CoreError> {
        let sids = self.smembers_sorted(&Self::escalations_key()).await?;
        self.read_metas(sids).await
    }

    async fn assign_agent(&self, sid: &str, agent_id: &str) -> Result<(), CoreError> {
        if agent_id.is_empty() {
            return Ok(());
        }
        let mut con = self.conn.clone();
        self.timed(
            redis::cmd("SADD").arg(Self::agent_sessions_key(agent_id)).arg(sid).query_async::<_, ()>(&mut con),
        )
        .await
    }

    async fn unassign_agent(&self, sid: &str, agent_id: &str) -> Result<(), CoreError> {
        if agent_id.is_empty() {
            return Ok(());
        }
        let mut con = self.conn.clone();
        self.timed(
            redis::cmd("SREM").arg(Self::agent_sessions_key(agent_id)).arg(sid).query_async::<_, ()>(&mut con),
        )
        .await
    }

    async fn list_agent_sessions(&self, agent_id: &str) -> Result<Vec<SessionMeta>, CoreError> {
        if agent_id.is_empty() {
            return Ok(Vec::new());
        }
        let sids = self.smembers_sorted(&Self::agent_sessions_key(agent_id)).await?;
        self.read_metas(sids).await
    }
}

/// In-memory fake used by tests in place of a live Redis deployment. Mirrors
/// the atomicity and ordering contracts of [`RedisSessionStore`] without any
/// network I/O.
#[derive(Default)]
pub struct InMemorySessionStore {
    metas: Mutex<HashMap<String, SessionMeta>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    user_sessions: Mutex<HashMap<String, Vec<String>>>,
    escalations: Mutex<Vec<String>>,
    agent_sessions: Mutex<HashMap<String, Vec<String>>>,
    recent_window: usize,
}

impl InMemorySessionStore {
    pub fn new(recent_window: usize) -> Self {
        Self { recent_window, ..Default::default() }
    }

    fn push_unique(set: &mut Vec<String>, value: String) {
        if !set.contains(&value) {
            set.push(value);
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn read_meta(&self, sid: &str) -> Result<Option<SessionMeta>, CoreError> {
        Ok(self.metas.lock().unwrap().get(sid).cloned())
    }

    async fn write_meta(&self, meta: &SessionMeta) -> Result<(), CoreError> {
        self.metas.lock().unwrap().insert(meta.session_id.clone(), meta.clone());
        Ok(())
    }

    async fn register(&self, user_id: &str, sid: &str) -> Result<(), CoreError> {
        if user_id.is_empty() {
            return Ok(());
        }
        let mut idx = self.user_sessions.lock().unwrap();
        Self::push_unique(idx.entry(user_id.to_string()).or_default(), sid.to_string());
        Ok(())
    }

    async fn unregister(&self, user_id: &str, sid: &str) -> Result<(), CoreError> {
        if let Some(set) = self.user_sessions.lock().unwrap().get_mut(user_id) {
            set.retain(|s| s != sid);
        }
        Ok(())
    }

    async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<SessionMeta>, CoreError> {
        let mut sids = self.user_sessions.lock().unwrap().get(user_id).cloned().unwrap_or_default();
        sids.sort();
        let metas = self.metas.lock().unwrap();
        Ok(sids.iter().filter_map(|s| metas.get(s).cloned()).collect())
    }

    async fn append_message(&self, sid: &str, msg: &Message) -> Result<(), CoreError> {
        self.messages.lock().unwrap().entry(sid.to_string()).or_default().push(msg.clone());
        Ok(())
    }

    async fn recent(&self, sid: &str) -> Result<Vec<Message>, CoreError> {
        let all = self.messages.lock().unwrap().get(sid).cloned().unwrap_or_default();
        if self.recent_window == 0 || all.len() <= self.recent_window {
            return Ok(all);
        }
        Ok(all[all.len() - self.recent_window..].to_vec())
    }

    async fn all_messages(&self, sid: &str, limit: Option<usize>) -> Result<Vec<Message>, CoreError> {
        let all = self.messages.lock().unwrap().get(sid).cloned().unwrap_or_default();
        match limit {
            Some(0) => Ok(Vec::new()),
            Some(n) if n < all.len() => Ok(all[all.len() - n..].to_vec()),
            _ => Ok(all),
        }
    }

    async fn touch(&self, _sid: &str) -> Result<(), CoreError> {
        Ok(())
    }

    async fn delete(&self, sid: &str) -> Result<(), CoreError> {
        self.metas.lock().unwrap().remove(sid);
        self.messages.lock().unwrap().remove(sid);
        Ok(())
    }

    async fn enqueue_escalation(&self, sid: &str) -> Result<(), CoreError> {
        let mut esc = self.escalations.lock().unwrap();
        Self::push_unique(&mut esc, sid.to_string());
        Ok(())
    }

    async fn dequeue_escalation(&self, sid: &str) -> Result<(), CoreError> {
        self.escalations.lock().unwrap().retain(|s| s != sid);
        Ok(())
    }

    async fn list_escalations(&self) -> Result<Vec<SessionMeta>, CoreError> {
        let mut sids = self.escalations.lock().unwrap().clone();
        sids.sort();
        let metas = self.metas.lock().unwrap();
        Ok(sids.iter().filter_map(|s| metas.get(s).cloned()).collect())
    }

    async fn assign_agent(&self, sid: &str, agent_id: &str) -> Result<(), CoreError> {
        if agent_id.is_empty() {
            return Ok(());
        }
        let mut idx = self.agent_sessions.lock().unwrap();
        Self::push_unique(idx.entry(agent_id.to_string()).or_default(), sid.to_string());
        Ok(())
    }

    async fn unassign_agent(&self, sid: &str, agent_id: &str) -> Result<(), CoreError> {
        if let Some(set) = self.agent_sessions.lock().unwrap().get_mut(agent_id) {
            set.retain(|s| s != sid);
        }
        Ok(())
    }

    async fn list_agent_sessions(&self, agent_id: &str) -> Result<Vec<SessionMeta>, CoreError> {
        let mut sids = self.agent_sessions.lock().unwrap().get(agent_id).cloned().unwrap_or_default();
        sids.sort();
        let metas = self.metas.lock().unwrap();
        Ok(sids.iter().filter_map(|s| metas.get(s).cloned()).collect())
    }
}
