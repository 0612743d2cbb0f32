use crate::domain::{Message, Role};
use crate::llm::{ChatMessage, LlmClient};

/// Summarize a slice of buffer messages into at most `max_chars` characters
/// (§4.11 step 8). Returns an empty string on any failure — the driver
/// treats that as "summary stays stale" rather than an error.
pub async fn summarize(llm: &dyn LlmClient, model: &str, messages: &[Message], max_chars: usize) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let joined = messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Agent => "agent",
            };
            format!("{}: {}", role, m.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n");

    if joined.is_empty() {
        return String::new();
    }

    let prompt = format!(
        "Summarize the following customer support conversation concisely. Keep key customer \
         concerns, promises made, and next steps. Avoid PII, and limit to {} characters.\n\n{}",
        max_chars, joined,
    );

    let chat_messages = vec![
        ChatMessage::system("You summarize conversations succinctly.".to_string()),
        ChatMessage::user(prompt),
    ];

    match llm.chat(model, chat_messages, 0.2, 200).await {
        Ok(text) => text.trim().chars().take(max_chars).collect(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StaticLlm(String);

    #[async_trait]
    impl LlmClient for StaticLlm {
        async fn chat(&self, _m: &str, _msgs: Vec<ChatMessage>, _t: f32, _mt: u32) -> Result<String, CoreError> {
            Ok(self.0.clone())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn chat(&self, _m: &str, _msgs: Vec<ChatMessage>, _t: f32, _mt: u32) -> Result<String, CoreError> {
            Err(CoreError::GenerationFailure("down".to_string()))
        }
    }

    fn msg(role: Role, content: &str) -> Message {
        Message { role, content: content.to_string(), created_at: Utc::now() }
    }

    #[tokio::test]
    async fn empty_buffer_yields_empty_summary() {
        let out = summarize(&StaticLlm("anything".to_string()), "m", &[], 256).await;
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn truncates_to_max_chars() {
        let long = "x".repeat(500);
        let messages = vec![msg(Role::User, "hi")];
        let out = summarize(&StaticLlm(long), "m", &messages, 50).await;
        assert_eq!(out.chars().count(), 50);
    }

    #[tokio::test]
    async fn failure_yields_empty_string() {
        let messages = vec![msg(Role::User, "hi")];
        let out = summarize(&FailingLlm, "m", &messages, 256).await;
        assert_eq!(out, "");
    }
}
