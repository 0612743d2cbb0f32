use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `status` only ever advances along `active -> pending_handoff -> live_agent
/// -> closed`, with `active -> closed` also permitted. `closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    PendingHandoff,
    LiveAgent,
    Closed,
}

impl SessionStatus {
    /// Whether `self -> next` is a legal state-machine edge.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Active, PendingHandoff) => true,
            (Active, Closed) => true,
            (PendingHandoff, LiveAgent) => true,
            (LiveAgent, Closed) => true,
            (s, n) if s == n => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Session metadata, persisted by the session store while live and moved to
/// the archival store on close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub message_count: u32,
    pub summary: Option<String>,
    pub summary_message_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub greeting_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_agent_message_at: Option<DateTime<Utc>>,
}

impl SessionMeta {
    pub fn new(session_id: String, user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            user_id,
            status: SessionStatus::Active,
            created_at: now,
            last_updated: now,
            message_count: 0,
            summary: None,
            summary_message_count: 0,
            first_name: None,
            last_name: None,
            greeting_sent: false,
            agent_id: None,
            escalated_at: None,
            escalation_reason: None,
            claimed_at: None,
            last_agent_message_at: None,
        }
    }
}

/// Query classification produced by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Chitchat,
    PolicyOnly,
    NeedsIdentifier,
    OrderLookup,
    BillingIssue,
    Escalation,
}

/// Provenance pointer attached to an answer: either a DB row
/// (`db:orders#<id>`) or a document chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Citation {
    pub fn db(table: &str, id: &str) -> Self {
        Self { source: format!("db:{}#{}", table, id), title: None, page: None, score: None }
    }
}

/// A single order row, joined with its customer and product, as returned by
/// SQL retrieval. Email fields are masked before this struct is ever
/// serialized into a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRow {
    pub order_id: String,
    pub customer_email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub product_name: String,
    pub quantity: i32,
    pub ordered_at: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,
}

/// A retrieved and (if available) reranked document chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocChunk {
    pub id: String,
    pub text: String,
    pub title: Option<String>,
    pub source: String,
    pub page: Option<u32>,
    pub score: f32,
}

/// A semantic cache hit or write-back payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheEntry {
    pub query: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub query_type: QueryType,
    pub trace_id: String,
}

/// Transient, one-per-request turn state threaded through the graph. Not
/// persisted as a whole — individual fields land in the session store, the
/// HTTP response, or the semantic cache.
#[derive(Debug, Clone)]
pub struct TurnState {
    // Input
    pub query: String,
    pub user_id: String,
    pub session_id: String,
    pub recent_messages: Vec<Message>,
    pub summary: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,

    // Accumulated by the graph
    pub query_type: Option<QueryType>,
    pub should_retrieve_sql: bool,
    pub should_retrieve_docs: bool,
    pub order_id: Option<String>,
    pub sql_rows: Vec<OrderRow>,
    pub docs: Vec<DocChunk>,
    pub citations: Vec<Citation>,
    pub answer: String,
    pub cache_key: Option<String>,
    pub cache_hit: bool,
    pub should_cache: bool,
    pub grounded: Option<bool>,
    pub grounded_explanation: Option<String>,
    pub grounded_retry_count: u32,
    pub should_escalate: bool,
    pub escalation_reason: Option<String>,
    pub trace_id: String,
}

impl TurnState {
    pub fn new(
        query: String,
        user_id: String,
        session_id: String,
        recent_messages: Vec<Message>,
        summary: Option<String>,
        first_name: Option<String>,
        last_name: Option<String>,
        trace_id: String,
    ) -> Self {
        Self {
            query,
            user_id,
            session_id,
            recent_messages,
            summary,
            first_name,
            last_name,
            query_type: None,
            should_retrieve_sql: false,
            should_retrieve_docs: false,
            order_id: None,
            sql_rows: Vec::new(),
            docs: Vec::new(),
            citations: Vec::new(),
            answer: String::new(),
            cache_key: None,
            cache_hit: false,
            should_cache: false,
            grounded: None,
            grounded_explanation: None,
            grounded_retry_count: 0,
            should_escalate: false,
            escalation_reason: None,
            trace_id,
        }
    }

    /// A copy of this state with no cache handle aliasing concerns — the
    /// turn state never actually holds a live handle (those are passed
    /// separately to collaborators), so this is a plain deep clone used by
    /// the parallel retrieval fan-out to hand each task its own state.
    pub fn fork(&self) -> Self {
        self.clone()
    }
}
