use crate::error::CoreError;
use async_trait::async_trait;

/// Capability contract for the cross-encoder reranker (§6): score each
/// `(query, text)` pair, higher is more relevant.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, CoreError>;
}

/// HTTP-backed cross-encoder, scoring against a dedicated reranker service
/// in the same reqwest idiom as [`crate::vector::QdrantVectorIndex`] and
/// [`crate::llm::HttpLlmClient`]. The source's reranker is a non-functional
/// placeholder (`[(p, 1.0) for p in passages[:top_k]]`), so this is
/// generalized into a genuine scoring call rather than ported verbatim.
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCrossEncoder {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url }
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, CoreError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "pairs": pairs.iter().map(|(q, t)| serde_json::json!({"query": q, "text": t})).collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post(format!("{}/score", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(CoreError::RetrievalFailure(format!("reranker failed: {}", error)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        let scores: Vec<f32> = json["scores"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
            .ok_or_else(|| CoreError::RetrievalFailure("reranker returned no scores".to_string()))?;

        Ok(scores)
    }
}
