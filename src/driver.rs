use crate::archival_store::ArchivalStore;
use crate::domain::{Message, Role, SessionMeta, SessionStatus, TurnState};
use crate::error::{best_effort, CoreError};
use crate::graph::Graph;
use crate::ids::generate_readable_session_id;
use crate::masking::derive_name;
use crate::notification::{EscalationAlert, NotificationSink};
use crate::session_store::SessionStore;
use crate::summarize;
use chrono::Utc;
use std::sync::Arc;

const DEFAULT_ESCALATION_NOTICE: &str =
    "\n\nI've connected you with a member of our support team — they'll follow up shortly.";

/// Result of a turn, carrying everything the HTTP adapter needs for the
/// `POST /v1/chat` response shape (§6).
#[derive(Debug, Clone)]
pub struct ChatTurnResult {
    pub session_id: String,
    pub answer: String,
    pub citations: Vec<crate::domain::Citation>,
    pub should_escalate: bool,
    pub trace_id: String,
    pub cache_hit: bool,
    pub session_status: SessionStatus,
}

/// Per-turn orchestrator (§4.11): session lookup/ownership, greeting
/// injection, graph invocation, escalation transition, summarization gate,
/// persistence. Holds the process-wide collaborator handles.
pub struct ChatDriver {
    session_store: Arc<dyn SessionStore>,
    archival_store: Option<Arc<dyn ArchivalStore>>,
    notification_sink: Arc<dyn NotificationSink>,
    graph: Arc<Graph>,
    llm: Arc<dyn crate::llm::LlmClient>,
    summary_model: String,
    summary_min_messages: u32,
    summary_history_limit: usize,
    summary_max_chars: usize,
}

impl ChatDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        archival_store: Option<Arc<dyn ArchivalStore>>,
        notification_sink: Arc<dyn NotificationSink>,
        graph: Arc<Graph>,
        llm: Arc<dyn crate::llm::LlmClient>,
        summary_model: String,
        summary_min_messages: u32,
        summary_history_limit: usize,
        summary_max_chars: usize,
    ) -> Self {
        Self {
            session_store,
            archival_store,
            notification_sink,
            graph,
            llm,
            summary_model,
            summary_min_messages,
            summary_history_limit,
            summary_max_chars,
        }
    }

    /// The live session store, for adapters that need to read session
    /// metadata or history outside of a chat turn (e.g. `GET /v1/sessions`).
    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.session_store
    }

    /// Run one full turn `(user_id, query, session_id?)`.
    pub async fn handle_turn(
        &self,
        user_id: &str,
        query: &str,
        session_id: Option<String>,
    ) -> Result<ChatTurnResult, CoreError> {
        if user_id.trim().is_empty() || query.trim().is_empty() {
            return Err(CoreError::InvalidInput("user_id and query are required".to_string()));
        }

        let now = Utc::now();
        let sid = match session_id {
            Some(sid) => sid,
            None => generate_readable_session_id(user_id, now),
        };

        let mut meta = self
            .session_store
            .read_meta(&sid)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        if let Some(existing) = &meta {
            if existing.user_id != user_id {
                return Err(CoreError::Unauthorized("session does not belong to this user".to_string()));
            }
        } else {
            let new_meta = SessionMeta::new(sid.clone(), user_id.to_string(), now);
            self.session_store
                .write_meta(&new_meta)
                .await
                .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
            self.session_store
                .register(user_id, &sid)
                .await
                .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
            meta = Some(new_meta);
        }

        let mut meta = meta.expect("meta initialized above");

        if meta.first_name.is_none() && meta.last_name.is_none() {
            let (first, last) = derive_name(user_id);
            meta.first_name = first;
            meta.last_name = last;
        }

        if !meta.greeting_sent {
            let greeting_name = meta.first_name.clone().unwrap_or_else(|| "there".to_string());
            let greeting = format!("Hello {}, how can I assist you today!", greeting_name);
            self.session_store
                .append_message(&sid, &Message { role: Role::Assistant, content: greeting, created_at: now })
                .await
                .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
            meta.greeting_sent = true;
            meta.message_count += 1;
        }

        if matches!(meta.status, SessionStatus::PendingHandoff | SessionStatus::LiveAgent) {
            self.session_store
                .append_message(&sid, &Message { role: Role::User, content: query.to_string(), created_at: now })
                .await
                .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
            meta.message_count += 1;
            meta.last_updated = now;
            self.session_store
                .write_meta(&meta)
                .await
                .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
            self.session_store
                .touch(&sid)
                .await
                .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

            return Ok(ChatTurnResult {
                session_id: sid,
                answer: String::new(),
                citations: Vec::new(),
                should_escalate: false,
                trace_id: String::new(),
                cache_hit: false,
                session_status: meta.status,
            });
        }

        let recent = self
            .session_store
            .recent(&sid)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        let mut turn = TurnState::new(
            query.to_string(),
            user_id.to_string(),
            sid.clone(),
            recent,
            meta.summary.clone(),
            meta.first_name.clone(),
            meta.last_name.clone(),
            uuid::Uuid::new_v4().to_string(),
        );

        self.graph.run(&mut turn).await;

        self.session_store
            .append_message(&sid, &Message { role: Role::User, content: query.to_string(), created_at: now })
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        self.session_store
            .append_message(
                &sid,
                &Message { role: Role::Assistant, content: turn.answer.clone(), created_at: now },
            )
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        meta.message_count += 2;

        if turn.should_escalate {
            turn.answer.push_str(DEFAULT_ESCALATION_NOTICE);

            let was_already_handoff =
                matches!(meta.status, SessionStatus::PendingHandoff | SessionStatus::LiveAgent);
            if !was_already_handoff {
                meta.status = SessionStatus::PendingHandoff;
                meta.escalated_at = Some(now);
                meta.escalation_reason = turn.escalation_reason.clone();

                self.session_store
                    .enqueue_escalation(&sid)
                    .await
                    .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

                let alert = EscalationAlert {
                    session_id: sid.clone(),
                    user_id: user_id.to_string(),
                    latest_query: query.to_string(),
                    assistant_answer: turn.answer.clone(),
                    reason: meta
                        .escalation_reason
                        .clone()
                        .unwrap_or_else(|| "User requested human assistance.".to_string()),
                };
                best_effort("notification", (), self.notification_sink.notify_escalation(&alert)).await;
            }
        }

        if meta.message_count >= self.summary_min_messages && meta.message_count > meta.summary_message_count {
            let history = self
                .session_store
                .all_messages(&sid, Some(2 * self.summary_history_limit))
                .await
                .unwrap_or_default();
            let summary = summarize::summarize(
                self.llm.as_ref(),
                &self.summary_model,
                &history,
                self.summary_max_chars,
            )
            .await;
            if !summary.is_empty() {
                meta.summary = Some(summary);
                meta.summary_message_count = meta.message_count;
            }
        }

        meta.last_updated = now;
        self.session_store
            .write_meta(&meta)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        self.session_store
            .touch(&sid)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        Ok(ChatTurnResult {
            session_id: sid,
            answer: turn.answer,
            citations: turn.citations,
            should_escalate: turn.should_escalate,
            trace_id: turn.trace_id,
            cache_hit: turn.cache_hit,
            session_status: meta.status,
        })
    }

    /// Close a session: flushes the buffer to archival storage, removes it
    /// from live indices, unassigns any agent, and summarizes the history
    /// if no summary was supplied (§6 `POST /v1/sessions/{sid}/close`).
    pub async fn close_session(
        &self,
        sid: &str,
        user_id: &str,
        provided_summary: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), CoreError> {
        let meta = self
            .session_store
            .read_meta(sid)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?
            .ok_or_else(|| CoreError::NotFound("unknown session".to_string()))?;

        if meta.user_id != user_id {
            return Err(CoreError::Unauthorized("session does not belong to this user".to_string()));
        }

        if !meta.status.can_transition_to(SessionStatus::Closed) {
            return Err(CoreError::Conflict("illegal state transition".to_string()));
        }

        let messages = self
            .session_store
            .all_messages(sid, None)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        let mut closed_meta = meta.clone();
        closed_meta.status = SessionStatus::Closed;

        let summary = match provided_summary {
            Some(s) => Some(s),
            None if !messages.is_empty() => {
                let generated = summarize::summarize(
                    self.llm.as_ref(),
                    &self.summary_model,
                    &messages,
                    self.summary_max_chars,
                )
                .await;
                if generated.is_empty() { None } else { Some(generated) }
            }
            None => None,
        };
        if summary.is_some() {
            closed_meta.summary = summary;
        }

        if let Some(archival) = &self.archival_store {
            archival
                .archive_session(&closed_meta, &messages, metadata)
                .await
                .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        }

        if let Some(agent_id) = &meta.agent_id {
            self.session_store
                .unassign_agent(sid, agent_id)
                .await
                .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        }
        self.session_store
            .dequeue_escalation(sid)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        self.session_store
            .unregister(user_id, sid)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;
        self.session_store
            .delete(sid)
            .await
            .map_err(|e| CoreError::SessionStoreFailure(e.to_string()))?;

        Ok(())
    }
}
