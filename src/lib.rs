pub mod archival_store;
pub mod auth;
pub mod config;
pub mod doc_retrieval;
pub mod domain;
pub mod driver;
pub mod error;
pub mod generation;
pub mod graph;
pub mod groundedness;
pub mod http;
pub mod ids;
pub mod llm;
pub mod masking;
pub mod notification;
pub mod reranker;
pub mod retrieval;
pub mod router;
pub mod semantic_cache;
pub mod session_store;
pub mod sql_retrieval;
pub mod summarize;
pub mod vector;

use std::sync::Arc;

use crate::archival_store::ArchivalStore;
use crate::auth::AgentAuth;
use crate::config::Config;
use crate::driver::ChatDriver;
use crate::session_store::SessionStore;

/// Process-wide collaborator handles, analogous to the teacher's
/// `AppState`. Constructed once at startup by `main`, cloned cheaply into
/// every axum request (every field is an `Arc`/connection-pool handle).
#[derive(Clone)]
pub struct CoreState {
    pub driver: Arc<ChatDriver>,
    pub session_store: Arc<dyn SessionStore>,
    pub archival_store: Option<Arc<dyn ArchivalStore>>,
    pub agent_auth: Option<Arc<dyn AgentAuth>>,
    pub config: Arc<Config>,
}
