//! Shared in-memory collaborator fakes for the end-to-end scenarios, playing
//! the same role as `original_source/tests/conftest.py`'s fake Redis/Pinecone
//! doubles: every trait boundary gets a trivial, deterministic stand-in so a
//! full turn can run without any network collaborator.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use support_core::domain::OrderRow;
use support_core::error::CoreError;
use support_core::llm::{ChatMessage, LlmClient};
use support_core::notification::{EscalationAlert, NotificationSink};
use support_core::sql_retrieval::SqlRetriever;
use support_core::vector::{Embedder, VectorIndex, VectorMatch};

/// Classifies by keyword when asked for a label (max_tokens == 20),
/// confirms groundedness unconditionally (max_tokens == 60), and otherwise
/// answers with a canned, content-sniffed reply standing in for generation
/// (max_tokens == 400, per `generation::generate`'s fixed call shape).
/// `generation_calls` counts only that last bucket, so tests can assert the
/// deterministic order-lookup shortcut skipped the LLM entirely.
#[derive(Default)]
pub struct FakeLlm {
    pub generation_calls: AtomicU32,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation_call_count(&self) -> u32 {
        self.generation_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn chat(
        &self,
        _model: &str,
        messages: Vec<ChatMessage>,
        _temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CoreError> {
        let last = messages.last().map(|m| m.content.to_lowercase()).unwrap_or_default();

        if max_tokens == 20 {
            if last.contains("hi") || last.contains("hello") {
                return Ok("chitchat".to_string());
            }
            if last.contains("human agent") || last.contains("escalate") {
                return Ok("escalation".to_string());
            }
            if last.contains("return window") || last.contains("policy") {
                return Ok("policy_only".to_string());
            }
            return Ok("policy_only".to_string());
        }

        if max_tokens == 60 {
            return Ok("GROUNDED - answer matches the retrieved policy text".to_string());
        }

        self.generation_calls.fetch_add(1, Ordering::SeqCst);

        if last.contains("return window") || last.contains("policy") {
            return Ok("Our return window is 30 days from delivery.".to_string());
        }
        Ok("Hi there! How can I help you today?".to_string())
    }
}

/// A single in-memory namespace keyed by id, shared between the semantic
/// cache and the document retriever under different namespace strings.
/// `query` ignores the input vector and returns every stored entry with a
/// perfect score — adequate because [`FakeEmbedder`] is a constant map, so
/// there is no geometry for a real nearest-neighbor search to exploit.
#[derive(Default)]
pub struct FakeVectorIndex {
    store: Mutex<HashMap<String, Vec<(String, HashMap<String, serde_json::Value>)>>>,
    query_counts: Mutex<HashMap<String, u32>>,
}

impl FakeVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, namespace: &str, id: &str, metadata: HashMap<String, serde_json::Value>) {
        self.store.lock().unwrap().entry(namespace.to_string()).or_default().push((id.to_string(), metadata));
    }

    pub fn query_count(&self, namespace: &str) -> u32 {
        *self.query_counts.lock().unwrap().get(namespace).unwrap_or(&0)
    }
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    async fn upsert(
        &self,
        namespace: &str,
        id: &str,
        _vector: Vec<f32>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), CoreError> {
        let mut store = self.store.lock().unwrap();
        let entries = store.entry(namespace.to_string()).or_default();
        entries.retain(|(existing_id, _)| existing_id != id);
        entries.push((id.to_string(), metadata));
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        _vector: Vec<f32>,
        top_k: usize,
        _metadata_filter: Option<serde_json::Value>,
    ) -> Result<Vec<VectorMatch>, CoreError> {
        *self.query_counts.lock().unwrap().entry(namespace.to_string()).or_insert(0) += 1;
        let store = self.store.lock().unwrap();
        let matches = store
            .get(namespace)
            .map(|entries| {
                entries
                    .iter()
                    .take(top_k)
                    .map(|(id, metadata)| VectorMatch { id: id.clone(), score: 1.0, metadata: metadata.clone() })
                    .collect()
            })
            .unwrap_or_default();
        Ok(matches)
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<(), CoreError> {
        if let Some(entries) = self.store.lock().unwrap().get_mut(namespace) {
            entries.retain(|(id, _)| !ids.contains(id));
        }
        Ok(())
    }
}

/// Constant-vector embedder; the geometry doesn't matter for these fakes,
/// only that it never errors.
pub struct FakeEmbedder {
    pub calls: AtomicU32,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self { calls: AtomicU32::new(0) }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.1, 0.2, 0.3])
    }
}

#[derive(Default)]
pub struct CapturingNotificationSink {
    pub alerts: Mutex<Vec<EscalationAlert>>,
}

#[async_trait]
impl NotificationSink for CapturingNotificationSink {
    async fn notify_escalation(&self, alert: &EscalationAlert) -> Result<(), CoreError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Seeded `(order_id, user_id) -> OrderRow` map standing in for the
/// customers/orders/products join — enforces the same ownership gate as the
/// Postgres query (order exists AND belongs to the given user) without a
/// database.
#[derive(Default)]
pub struct FakeSqlRetriever {
    orders: Mutex<HashMap<(String, String), OrderRow>>,
}

impl FakeSqlRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, order_id: &str, owner_user_id: &str, row: OrderRow) {
        self.orders.lock().unwrap().insert((order_id.to_string(), owner_user_id.to_string()), row);
    }
}

#[async_trait]
impl SqlRetriever for FakeSqlRetriever {
    async fn fetch_order_for_user(&self, order_id: &str, user_id: &str) -> Result<Option<OrderRow>, CoreError> {
        Ok(self.orders.lock().unwrap().get(&(order_id.to_string(), user_id.to_string())).cloned())
    }
}
