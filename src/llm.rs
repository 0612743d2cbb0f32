use crate::error::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Capability contract for the chat LLM (§6): `{model, messages,
/// temperature, max_tokens} -> content`. Token streaming is out of scope
/// (§1 Non-goals); only the non-streaming call survives from the teacher's
/// `LLMService`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CoreError>;
}

/// Ollama-backed [`LlmClient`], grounded on the teacher's `LLMService::infer`.
pub struct HttpLlmClient {
    client: reqwest::Client,
    host: String,
}

impl HttpLlmClient {
    pub fn new(host: String, timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(timeout).build().unwrap_or_else(|_| reqwest::Client::new()),
            host,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CoreError> {
        let request = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            }
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::GenerationFailure(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CoreError::GenerationFailure(format!("ollama error ({}): {}", status, error_text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::GenerationFailure(e.to_string()))?;

        let content = json["message"]["content"]
            .as_str()
            .ok_or_else(|| CoreError::GenerationFailure("ollama returned no content".to_string()))?
            .to_string();

        Ok(content)
    }
}
