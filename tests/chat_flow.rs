//! End-to-end turn scenarios (S1-S6) driven entirely through `ChatDriver`
//! against in-memory collaborators — no network, no database.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{CapturingNotificationSink, FakeEmbedder, FakeLlm, FakeSqlRetriever, FakeVectorIndex};
use support_core::archival_store::InMemoryArchivalStore;
use support_core::doc_retrieval::DocRetriever;
use support_core::domain::{OrderRow, Role, SessionStatus};
use support_core::driver::ChatDriver;
use support_core::graph::Graph;
use support_core::retrieval::Retriever;
use support_core::semantic_cache::SemanticCache;
use support_core::session_store::InMemorySessionStore;
use support_core::sql_retrieval::SqlRetriever;

const DOC_NAMESPACE: &str = "docs";
const CACHE_NAMESPACE: &str = "cache";

fn build_driver() -> (ChatDriver, Arc<CapturingNotificationSink>, Arc<FakeVectorIndex>) {
    build_driver_with_sql(false, None).0
}

/// Same wiring as `build_driver`, but optionally enables SQL retrieval
/// (`db_available = true`) against a seeded `FakeSqlRetriever`, so the
/// router's order-lookup classification survives and the driver can exercise
/// the SQL branch without a live Postgres.
fn build_driver_with_sql(
    db_available: bool,
    sql_retriever: Option<Arc<FakeSqlRetriever>>,
) -> ((ChatDriver, Arc<CapturingNotificationSink>, Arc<FakeVectorIndex>), Arc<FakeLlm>) {
    let vector_index = Arc::new(FakeVectorIndex::new());
    let embedder = Arc::new(FakeEmbedder::new());
    let llm = Arc::new(FakeLlm::new());

    let mut policy_doc_metadata = std::collections::HashMap::new();
    policy_doc_metadata.insert("text".to_string(), serde_json::json!("Returns are accepted within 30 days."));
    policy_doc_metadata.insert("source".to_string(), serde_json::json!("doc:return-policy"));
    vector_index.seed(DOC_NAMESPACE, "return-policy", policy_doc_metadata);

    let doc_retriever = Arc::new(DocRetriever::new(
        vector_index.clone() as Arc<dyn support_core::vector::VectorIndex>,
        embedder.clone() as Arc<dyn support_core::vector::Embedder>,
        None,
        DOC_NAMESPACE.to_string(),
        10,
        3,
    ));
    let sql_retriever = sql_retriever.map(|r| r as Arc<dyn SqlRetriever>);
    let retriever = Arc::new(Retriever::new(doc_retriever, sql_retriever));

    let semantic_cache = Arc::new(SemanticCache::new(
        vector_index.clone() as Arc<dyn support_core::vector::VectorIndex>,
        embedder.clone() as Arc<dyn support_core::vector::Embedder>,
        CACHE_NAMESPACE.to_string(),
        0.9,
        3,
    ));

    let graph = Arc::new(Graph::new(
        llm.clone(),
        "model".to_string(),
        Some(semantic_cache),
        retriever,
        db_available,
        12,
    ));

    let notification_sink = Arc::new(CapturingNotificationSink::default());
    let session_store = Arc::new(InMemorySessionStore::new(12));
    let archival_store = Arc::new(InMemoryArchivalStore::default());

    let driver = ChatDriver::new(
        session_store,
        Some(archival_store),
        notification_sink.clone(),
        graph,
        llm.clone(),
        "model".to_string(),
        12,
        40,
        256,
    );

    ((driver, notification_sink, vector_index), llm)
}

#[tokio::test]
async fn s1_greeting_injects_personalized_hello() {
    let (driver, _notify, _vector) = build_driver();

    let result = driver.handle_turn("alice@example.com", "hi", None).await.unwrap();

    assert_eq!(result.session_status, SessionStatus::Active);
    assert!(!result.cache_hit);
    assert!(!result.answer.is_empty());

    let meta = driver.session_store().read_meta(&result.session_id).await.unwrap().unwrap();
    assert!(meta.greeting_sent);
    assert_eq!(meta.first_name.as_deref(), Some("Alice"));

    let messages = driver.session_store().all_messages(&result.session_id, None).await.unwrap();
    assert_eq!(messages[0].role, Role::Assistant);
    assert_eq!(messages[0].content, "Hello Alice, how can I assist you today!");
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "hi");
    assert_eq!(messages[2].role, Role::Assistant);
}

#[tokio::test]
async fn s3_policy_only_cache_miss_then_hit() {
    let (driver, _notify, vector) = build_driver();

    let first = driver
        .handle_turn("bob@example.com", "What is your return window?", None)
        .await
        .unwrap();
    assert!(!first.cache_hit);
    assert!(first.answer.contains("30 days"));

    let docs_queries_after_first = vector.query_count(DOC_NAMESPACE);
    assert!(docs_queries_after_first >= 1);

    let second = driver
        .handle_turn("bob@example.com", "  what IS your return window?  ", None)
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.answer, first.answer);

    // Retrieval must not have run again on the cache hit.
    assert_eq!(vector.query_count(DOC_NAMESPACE), docs_queries_after_first);
}

#[tokio::test]
async fn s4_escalation_transitions_to_pending_handoff() {
    let (driver, notify, _vector) = build_driver();

    let result = driver
        .handle_turn("carol@example.com", "I want to talk to a human agent please", None)
        .await
        .unwrap();

    assert!(result.should_escalate);
    assert_eq!(result.session_status, SessionStatus::PendingHandoff);
    assert!(result.answer.ends_with(
        "\n\nI've connected you with a member of our support team — they'll follow up shortly."
    ));

    let escalations = driver.session_store().list_escalations().await.unwrap();
    assert!(escalations.iter().any(|s| s.session_id == result.session_id));

    let alerts = notify.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].session_id, result.session_id);
}

#[tokio::test]
async fn s5_handoff_lockout_skips_the_graph() {
    let (driver, _notify, vector) = build_driver();

    let first = driver
        .handle_turn("dave@example.com", "I want to talk to a human agent please", None)
        .await
        .unwrap();
    assert_eq!(first.session_status, SessionStatus::PendingHandoff);

    let docs_queries_after_escalation = vector.query_count(DOC_NAMESPACE);

    let second = driver
        .handle_turn("dave@example.com", "are you still there?", Some(first.session_id.clone()))
        .await
        .unwrap();

    assert_eq!(second.answer, "");
    assert_eq!(second.session_status, SessionStatus::PendingHandoff);
    assert_eq!(second.citations.len(), 0);
    // No new doc retrieval happened — the graph was never invoked.
    assert_eq!(vector.query_count(DOC_NAMESPACE), docs_queries_after_escalation);

    let messages = driver.session_store().all_messages(&second.session_id, None).await.unwrap();
    assert_eq!(messages.last().unwrap().content, "are you still there?");
    assert_eq!(messages.last().unwrap().role, Role::User);
}

fn seed_order_18(sql_retriever: &FakeSqlRetriever, owner_user_id: &str) {
    sql_retriever.seed(
        "18",
        owner_user_id,
        OrderRow {
            order_id: "18".to_string(),
            customer_email: "owner@example.com".to_string(),
            first_name: Some("Owner".to_string()),
            last_name: None,
            product_name: "Widget".to_string(),
            quantity: 2,
            ordered_at: Utc::now(),
            delivery_date: None,
        },
    );
}

#[tokio::test]
async fn s2_order_lookup_answers_deterministically_without_llm() {
    let sql_retriever = Arc::new(FakeSqlRetriever::new());
    seed_order_18(&sql_retriever, "eve@example.com");

    let ((driver, _notify, _vector), llm) = build_driver_with_sql(true, Some(sql_retriever));

    let result = driver
        .handle_turn("eve@example.com", "What's the status of order 18?", None)
        .await
        .unwrap();

    assert!(result.answer.starts_with("Order #18"));
    assert!(result.answer.contains("Widget"));
    assert!(result.citations.iter().any(|c| c.source == "db:orders#18"));
    assert_eq!(llm.generation_call_count(), 0);
}

#[tokio::test]
async fn s6_unauthorized_order_leaks_nothing() {
    let sql_retriever = Arc::new(FakeSqlRetriever::new());
    seed_order_18(&sql_retriever, "owner@example.com");

    let ((driver, _notify, _vector), _llm) = build_driver_with_sql(true, Some(sql_retriever));

    let result = driver
        .handle_turn("mallory@example.com", "What's the status of order 18?", None)
        .await
        .unwrap();

    assert!(!result.answer.starts_with("Order #18"));
    assert!(!result.citations.iter().any(|c| c.source.starts_with("db:orders#")));
    assert!(!result.answer.contains("owner@example.com"));
    assert!(!result.answer.contains("Widget"));
}

