use crate::domain::TurnState;
use crate::llm::{ChatMessage, LlmClient};

const MAX_RETRIES: u32 = 1;

fn format_context(turn: &TurnState) -> String {
    if turn.docs.is_empty() {
        return "[no context]".to_string();
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

/// Judge whether `turn.answer` is supported by the retrieved context (§4.10).
/// Only runs if docs were retrieved and the answer is non-empty; mutates
/// `grounded`/`grounded_explanation` in place. Returns whether the driver
/// should route back to generation (grounded=false and the retry budget
/// is not exhausted).
pub async fn judge(llm: &dyn LlmClient, model: &str, turn: &mut TurnState) -> bool {
    if turn.docs.is_empty() || turn.answer.trim().is_empty() {
        turn.grounded = None;
        turn.grounded_explanation = None;
        return false;
    }

    let system = "You are a strict groundedness judge. Given the retrieved context sections and \
                  the assistant's answer, determine if the answer is directly supported by the \
                  context. Only return one of: GROUNDED or NOT_GROUNDED and then a short reason."
        .to_string();
    let user = format!(
        "Context:\n{}\n\nAnswer:\n{}\n\nRespond in the format: <VERDICT> - <short reason>.",
        format_context(turn),
        turn.answer.trim(),
    );

    let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];

    match llm.chat(model, messages, 0.0, 60).await {
        Ok(text) => {
            let normalized = text.trim().to_uppercase();
            let grounded = normalized.starts_with("GROUNDED") && !normalized.starts_with("NOT_GROUNDED");
            turn.grounded = Some(grounded);
            turn.grounded_explanation = Some(text.trim().to_string());

            if !grounded && turn.grounded_retry_count < MAX_RETRIES {
                turn.grounded_retry_count += 1;
                return true;
            }
            false
        }
        Err(e) => {
            turn.grounded = None;
            turn.grounded_explanation = Some(format!("groundedness judge failed: {}", e));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocChunk, Message};
    use crate::error::CoreError;
    use async_trait::async_trait;

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
            Err(CoreError::JudgeFailure("down".to_string()))
        }
    }

    fn make_turn_with_docs() -> TurnState {
        let mut turn = TurnState::new(
            "what is your return policy".to_string(),
            "u1".to_string(),
            "s1".to_string(),
            Vec::<Message>::new(),
            None,
            None,
            None,
            "trace-1".to_string(),
        );
        turn.docs.push(DocChunk {
            id: "a".to_string(),
            text: "returns accepted within 30 days".to_string(),
            title: Some("Returns".to_string()),
            source: "kb:returns".to_string(),
            page: None,
            score: 0.9,
        });
        turn.answer = "You can return items within 30 days.".to_string();
        turn
    }

    #[tokio::test]
    async fn skip_without_docs() {
        let mut turn = make_turn_with_docs();
        turn.docs.clear();
        let retry = judge(&StaticLlm("GROUNDED - fine"), "m", &mut turn).await;
        assert!(!retry);
        assert_eq!(turn.grounded, None);
    }

    #[tokio::test]
    async fn not_grounded_triggers_single_retry() {
        let mut turn = make_turn_with_docs();
        let retry = judge(&StaticLlm("NOT_GROUNDED - missing citation"), "m", &mut turn).await;
        assert!(retry);
        assert_eq!(turn.grounded, Some(false));
        assert_eq!(turn.grounded_retry_count, 1);

        let retry_again = judge(&StaticLlm("NOT_GROUNDED - still missing"), "m", &mut turn).await;
        assert!(!retry_again);
        assert_eq!(turn.grounded_retry_count, 1);
    }

    #[tokio::test]
    async fn judge_failure_yields_unknown_and_no_retry() {
        let mut turn = make_turn_with_docs();
        let retry = judge(&FailingLlm, "m", &mut turn).await;
        assert!(!retry);
        assert_eq!(turn.grounded, None);
    }
}
