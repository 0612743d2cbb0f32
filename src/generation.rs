use crate::domain::{Message, QueryType, Role, TurnState};
use crate::error::CoreError;
use crate::llm::{ChatMessage, LlmClient};
use crate::semantic_cache::SemanticCache;
use std::sync::Arc;

fn query_type_label(qt: QueryType) -> &'static str {
    match qt {
        QueryType::Chitchat => "chitchat",
        QueryType::PolicyOnly => "policy_only",
        QueryType::NeedsIdentifier => "needs_identifier",
        QueryType::OrderLookup => "order_lookup",
        QueryType::BillingIssue => "billing_issue",
        QueryType::Escalation => "escalation",
    }
}

/// Deterministic shortcut answer for an order lookup — no LLM call.
fn deterministic_order_answer(turn: &TurnState) -> Option<String> {
    let row = turn.sql_rows.first()?;
    Some(format!(
        "Order #{}: {} x {}, ordered on {}, delivery {}.",
        row.order_id,
        row.quantity,
        row.product_name,
        row.ordered_at.format("%Y-%m-%d"),
        row.delivery_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_else(|| "unknown".to_string()),
    ))
}

/// Renders the last `window` non-empty turns, role-prefixed (§4.9). Empty
/// messages are filtered out before the window is applied, so a run of
/// blank turns never crowds out real conversation.
fn render_recent_conversation(messages: &[Message], window: usize) -> String {
    let non_empty: Vec<&Message> = messages.iter().filter(|m| !m.content.trim().is_empty()).collect();
    let tail: Vec<&&Message> = non_empty.iter().rev().take(window).rev().collect();
    if tail.is_empty() {
        return "[no prior turns]".to_string();
    }
    tail.iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Agent => "agent",
            };
            format!("{}: {}", role, m.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_db_facts(turn: &TurnState) -> String {
    if turn.sql_rows.is_empty() {
        return "[no database records retrieved]".to_string();
    }
    turn.sql_rows
        .iter()
        .map(|row| {
            format!(
                "order #{} — {} x {} for {}, ordered {}, delivery {}",
                row.order_id,
                row.quantity,
                row.product_name,
                row.customer_email,
                row.ordered_at.format("%Y-%m-%d"),
                row.delivery_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_else(|| "unknown".to_string()),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_policy_context(turn: &TurnState) -> String {
    if turn.docs.is_empty() {
        return "[no policy context retrieved]".to_string();
    }
    turn.docs
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let title = d.title.clone().unwrap_or_default();
            let mut header = format!("[{}] {} — {}", i + 1, title, d.source);
            if let Some(page) = d.page {
                header.push_str(&format!(" (p.{})", page));
            }
            format!("{}\n{}", header, d.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_system_prompt() -> String {
    "You are a customer support assistant. Database facts are authoritative; policy context is \
     advisory only. If required identifiers are missing, ask one concise clarifying question. \
     NEVER disclose personal data (emails, addresses, names, phone numbers) the user has not \
     explicitly provided in the conversation; when referencing such data, use its masked form. \
     If the answer is not supported by the available facts, say so plainly and state what is \
     missing."
        .to_string()
}

fn build_user_prompt(turn: &TurnState, recent_window: usize, groundedness_feedback: Option<&str>) -> String {
    let intent = turn.query_type.map(query_type_label).unwrap_or("policy_only");
    let summary = turn.summary.clone().unwrap_or_else(|| "[no summary yet]".to_string());

    let mut prompt = format!(
        "User intent: {}\n\n\
         User question:\n{}\n\n\
         Session summary:\n{}\n\n\
         Recent conversation:\n{}\n\n\
         Database facts:\n{}\n\n\
         Policy context:\n{}",
        intent,
        turn.query,
        summary,
        render_recent_conversation(&turn.recent_messages, recent_window),
        render_db_facts(turn),
        render_policy_context(turn),
    );

    if let Some(feedback) = groundedness_feedback {
        prompt.push_str(&format!(
            "\n\nGroundedness feedback:\n{}\nRevise your answer so it is directly supported by the \
             database facts and policy context above.",
            feedback
        ));
    }

    prompt
}

/// Produce an answer for `turn` (§4.9): deterministic shortcut for order
/// lookups, else a five-block prompt sent to the LLM at temperature 0.1.
/// Never returns an error — generation failures become the answer text
/// itself so the driver still records the turn.
pub async fn generate(
    llm: &dyn LlmClient,
    model: &str,
    turn: &mut TurnState,
    recent_window: usize,
    groundedness_feedback: Option<&str>,
) {
    if let Some(answer) = deterministic_order_answer(turn) {
        turn.answer = answer;
        return;
    }

    let messages = vec![
        ChatMessage::system(build_system_prompt()),
        ChatMessage::user(build_user_prompt(turn, recent_window, groundedness_feedback)),
    ];

    match llm.chat(model, messages, 0.1, 400).await {
        Ok(answer) => turn.answer = answer,
        Err(e) => turn.answer = format!("Failed to generate answer: {}", e),
    }
}

/// Cache write-back (§4.9): upsert iff `should_cache ∧ ¬cache_hit ∧
/// cache_key ∧ user_id`. Errors are swallowed — the caller wraps this in
/// `best_effort` if it wants the log line, but a failure here must never
/// surface to the turn.
pub async fn write_back_cache(cache: &SemanticCache, turn: &TurnState) -> Result<(), CoreError> {
    if !turn.should_cache || turn.cache_hit || turn.user_id.is_empty() {
        return Ok(());
    }
    let Some(key) = &turn.cache_key else { return Ok(()) };

    let entry = crate::domain::SemanticCacheEntry {
        query: turn.query.clone(),
        answer: turn.answer.clone(),
        citations: turn.citations.clone(),
        query_type: turn.query_type.unwrap_or(QueryType::PolicyOnly),
        trace_id: turn.trace_id.clone(),
    };
    cache.upsert(key, &entry).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderRow;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StaticLlm(&'static str);

    #[async_trait]
    impl LlmClient for StaticLlm {
        async fn chat(&self, _m: &str, _msgs: Vec<ChatMessage>, _t: f32, _mt: u32) -> Result<String, CoreError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn chat(&self, _m: &str, _msgs: Vec<ChatMessage>, _t: f32, _mt: u32) -> Result<String, CoreError> {
            Err(CoreError::GenerationFailure("timeout".to_string()))
        }
    }

    fn make_turn() -> TurnState {
        TurnState::new(
            "where is my order".to_string(),
            "u1".to_string(),
            "s1".to_string(),
            Vec::new(),
            None,
            Some("Alice".to_string()),
            None,
            "trace-1".to_string(),
        )
    }

    #[tokio::test]
    async fn order_lookup_skips_llm_entirely() {
        let mut turn = make_turn();
        turn.sql_rows.push(OrderRow {
            order_id: "18".to_string(),
            customer_email: "a***@***.com".to_string(),
            first_name: Some("Alice".to_string()),
            last_name: None,
            product_name: "Widget".to_string(),
            quantity: 2,
            ordered_at: Utc::now(),
            delivery_date: None,
        });
        generate(&FailingLlm, "model", &mut turn, 12, None).await;
        assert!(turn.answer.starts_with("Order #18"));
    }

    #[tokio::test]
    async fn llm_failure_becomes_sentinel_answer() {
        let mut turn = make_turn();
        generate(&FailingLlm, "model", &mut turn, 12, None).await;
        assert!(turn.answer.starts_with("Failed to generate answer:"));
    }

    #[tokio::test]
    async fn successful_generation_uses_llm_output() {
        let mut turn = make_turn();
        generate(&StaticLlm("Here's the policy answer."), "model", &mut turn, 12, None).await;
        assert_eq!(turn.answer, "Here's the policy answer.");
    }

    #[test]
    fn recent_conversation_filters_empty_before_windowing() {
        let messages = vec![
            Message { role: Role::User, content: "".to_string(), created_at: Utc::now() },
            Message { role: Role::User, content: "first".to_string(), created_at: Utc::now() },
            Message { role: Role::Assistant, content: "".to_string(), created_at: Utc::now() },
            Message { role: Role::Assistant, content: "second".to_string(), created_at: Utc::now() },
            Message { role: Role::User, content: "third".to_string(), created_at: Utc::now() },
        ];
        let rendered = render_recent_conversation(&messages, 2);
        assert_eq!(rendered, "assistant: second\nuser: third");
    }

    #[test]
    fn recent_conversation_windows_to_configured_size() {
        let messages: Vec<Message> = (0..20)
            .map(|i| Message { role: Role::User, content: format!("turn {}", i), created_at: Utc::now() })
            .collect();
        let rendered = render_recent_conversation(&messages, 12);
        assert_eq!(rendered.lines().count(), 12);
        assert!(rendered.starts_with("user: turn 8"));
        assert!(rendered.ends_with("user: turn 19"));
    }
}
