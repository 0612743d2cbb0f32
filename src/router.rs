use crate::domain::QueryType;
use crate::llm::{ChatMessage, LlmClient};
use once_cell::sync::Lazy;
use regex::Regex;

/// Output of classification (§4.3): the final label plus the retrieval and
/// escalation flags it implies.
#[derive(Debug, Clone)]
pub struct RouterOutput {
    pub query_type: QueryType,
    pub should_retrieve_sql: bool,
    pub should_retrieve_docs: bool,
    pub should_escalate: bool,
    pub order_id: Option<String>,
}

static ORDER_WITH_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)order\s*(?:number|#)?\s*#?(\d{1,6})\b").unwrap());
static HASH_ORDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\d{1,6})\b").unwrap());
static BARE_ORDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#?(\d{1,6})\s*$").unwrap());

const LABELS: &[(&str, QueryType)] = &[
    ("chitchat", QueryType::Chitchat),
    ("policy_only", QueryType::PolicyOnly),
    ("needs_identifier", QueryType::NeedsIdentifier),
    ("order_lookup", QueryType::OrderLookup),
    ("billing_issue", QueryType::BillingIssue),
    ("escalation", QueryType::Escalation),
];

/// Recognize an order identifier in the raw query text: `order #N`,
/// `order number N`, `#N`, or the entire message being `#?N`.
fn extract_order_id(query: &str) -> Option<String> {
    if let Some(caps) = ORDER_WITH_KEYWORD.captures(query) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = BARE_ORDER.captures(query) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = HASH_ORDER.captures(query) {
        return Some(caps[1].to_string());
    }
    None
}

fn keyword_fallback(query: &str) -> QueryType {
    let q = query.to_lowercase();

    const GREETINGS: &[&str] = &["hi", "hello", "hey", "good morning", "good afternoon", "good evening"];
    if GREETINGS.iter().any(|g| q.trim() == *g || q.trim().starts_with(g)) {
        return QueryType::Chitchat;
    }
    if ["agent", "escalate", "supervisor", "complaint"].iter().any(|k| q.contains(k)) {
        return QueryType::Escalation;
    }
    if ["refund", "charge", "billing", "invoice", "payment"].iter().any(|k| q.contains(k)) {
        return QueryType::BillingIssue;
    }
    if ["order", "tracking", "shipment"].iter().any(|k| q.contains(k)) {
        return QueryType::OrderLookup;
    }
    if ["return", "exchange", "shipping", "policy"].iter().any(|k| q.contains(k)) {
        return QueryType::PolicyOnly;
    }
    QueryType::PolicyOnly
}

fn parse_label(text: &str) -> Option<QueryType> {
    let normalized = text.trim().to_lowercase();
    LABELS.iter().find(|(label, _)| normalized.contains(label)).map(|(_, qt)| *qt)
}

async fn classify_with_llm(query: &str, llm: &dyn LlmClient, model: &str) -> QueryType {
    let label_list = LABELS.iter().map(|(l, _)| *l).collect::<Vec<_>>().join(", ");
    let prompt = format!(
        "Classify the following customer support message into exactly one of these labels: {}.\n\
         Respond with only the label, nothing else.\n\nMessage: \"{}\"",
        label_list, query
    );

    let messages = vec![ChatMessage::user(prompt)];
    match llm.chat(model, messages, 0.0, 20).await {
        Ok(text) => parse_label(&text).unwrap_or_else(|| keyword_fallback(query)),
        Err(_) => keyword_fallback(query),
    }
}

/// Run the full six-way classification pipeline: entity extraction, LLM
/// classification with keyword fallback, order-id coercion, DB-availability
/// downgrade, and flag assignment.
pub async fn classify(query: &str, db_available: bool, llm: &dyn LlmClient, model: &str) -> RouterOutput {
    let order_id = extract_order_id(query);

    let mut query_type = classify_with_llm(query, llm, model).await;

    if order_id.is_some() {
        query_type = QueryType::OrderLookup;
    }

    if query_type == QueryType::OrderLookup && order_id.is_none() {
        query_type = QueryType::NeedsIdentifier;
    }

    if !db_available {
        query_type = match query_type {
            QueryType::BillingIssue => QueryType::PolicyOnly,
            QueryType::OrderLookup => QueryType::NeedsIdentifier,
            other => other,
        };
    }

    let q = query.to_lowercase();
    let mentions_policy_terms = ["refund", "policy", "return", "late", "delay", "delivery"]
        .iter()
        .any(|k| q.contains(k));

    let (should_retrieve_sql, should_retrieve_docs, should_escalate) = match query_type {
        QueryType::Chitchat => (false, false, false),
        QueryType::Escalation => (false, false, true),
        QueryType::PolicyOnly => (false, true, false),
        QueryType::NeedsIdentifier => (false, false, false),
        QueryType::OrderLookup => (true, mentions_policy_terms, false),
        QueryType::BillingIssue => (db_available && order_id.is_some(), true, false),
    };

    RouterOutput { query_type, should_retrieve_sql, should_retrieve_docs, should_escalate, order_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    struct StaticLlm(&'static str);

    #[async_trait::async_trait]
    impl LlmClient for StaticLlm {
        async fn chat(&self, _m: &str, _msgs: Vec<ChatMessage>, _t: f32, _mt: u32) -> Result<String, CoreError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingLlm;

    #[async_trait::async_trait]
    impl LlmClient for FailingLlm {
        async fn chat(&self, _m: &str, _msgs: Vec<ChatMessage>, _t: f32, _mt: u32) -> Result<String, CoreError> {
            Err(CoreError::GenerationFailure("down".to_string()))
        }
    }

    #[tokio::test]
    async fn order_identifier_forces_order_lookup() {
        let out = classify("What's the status of order 18?", true, &FailingLlm, "m").await;
        assert_eq!(out.query_type, QueryType::OrderLookup);
        assert_eq!(out.order_id.as_deref(), Some("18"));
        assert!(out.should_retrieve_sql);
    }

    #[tokio::test]
    async fn order_lookup_without_identifier_becomes_needs_identifier() {
        let out = classify("what's up with my order", true, &StaticLlm("order_lookup"), "m").await;
        assert_eq!(out.query_type, QueryType::NeedsIdentifier);
        assert!(!out.should_retrieve_sql);
    }

    #[tokio::test]
    async fn order_lookup_downgrades_without_db() {
        let out = classify("order 42", false, &FailingLlm, "m").await;
        assert_eq!(out.query_type, QueryType::NeedsIdentifier);
    }

    #[tokio::test]
    async fn billing_downgrades_to_policy_only_without_db() {
        let out = classify("question about my refund charge", false, &StaticLlm("billing_issue"), "m").await;
        assert_eq!(out.query_type, QueryType::PolicyOnly);
        assert!(out.should_retrieve_docs);
    }

    #[tokio::test]
    async fn escalation_sets_flag() {
        let out = classify("I want to talk to a human agent please", true, &StaticLlm("escalation"), "m").await;
        assert!(out.should_escalate);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_keywords() {
        let out = classify("I need a refund for my last charge", true, &FailingLlm, "m").await;
        assert_eq!(out.query_type, QueryType::BillingIssue);
    }

    #[tokio::test]
    async fn bare_order_number_is_recognized() {
        let out = classify("#18", true, &FailingLlm, "m").await;
        assert_eq!(out.order_id.as_deref(), Some("18"));
    }
}
