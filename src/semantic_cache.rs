use crate::domain::{Citation, QueryType, SemanticCacheEntry};
use crate::error::CoreError;
use crate::ids::sha256_hex;
use crate::vector::{Embedder, VectorIndex};
use std::sync::Arc;

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Embeds the query, queries the configured vector namespace, and gates on
/// `similarity_threshold` (§4.2). Citations are JSON-serialized into vector
/// metadata to survive scalar-only payload constraints.
pub struct SemanticCache {
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    namespace: String,
    similarity_threshold: f32,
    top_k: usize,
}

impl SemanticCache {
    pub fn new(
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        namespace: String,
        similarity_threshold: f32,
        top_k: usize,
    ) -> Self {
        Self { vector_index, embedder, namespace, similarity_threshold, top_k }
    }

    /// Stable hash of the normalized (trim+lowercase) query.
    pub fn key(&self, query: &str) -> String {
        sha256_hex(&normalize(query))
    }

    /// Returns the highest-scoring match above the threshold, or `None` if
    /// nothing clears it. Never returns an error — collaborator failures are
    /// already swallowed into a miss by the caller via `best_effort`, but the
    /// method itself also treats any step failure as "no match" so the
    /// request path is never at risk.
    pub async fn similar(&self, query: &str) -> Result<Option<SemanticCacheEntry>, CoreError> {
        let normalized = normalize(query);
        if normalized.is_empty() {
            return Ok(None);
        }

        let vector = self.embedder.embed(query).await?;
        let matches = self.vector_index.query(&self.namespace, vector, self.top_k, None).await?;

        for m in matches {
            if m.score < self.similarity_threshold {
                continue;
            }

            let answer = m.metadata.get("answer").and_then(|v| v.as_str());
            let Some(answer) = answer else { continue };

            let query_text = m.metadata.get("query").and_then(|v| v.as_str()).unwrap_or_default();
            let trace_id = m.metadata.get("trace_id").and_then(|v| v.as_str()).unwrap_or_default();
            let query_type = m
                .metadata
                .get("query_type")
                .and_then(|v| v.as_str())
                .and_then(|s| serde_json::from_value(serde_json::Value::String(s.to_string())).ok())
                .unwrap_or(QueryType::PolicyOnly);

            let citations: Vec<Citation> = m
                .metadata
                .get("citations")
                .and_then(|v| v.as_str())
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();

            return Ok(Some(SemanticCacheEntry {
                query: query_text.to_string(),
                answer: answer.to_string(),
                citations,
                query_type,
                trace_id: trace_id.to_string(),
            }));
        }

        Ok(None)
    }

    /// Embed the query and write the answer payload under `key`.
    pub async fn upsert(&self, key: &str, entry: &SemanticCacheEntry) -> Result<(), CoreError> {
        if key.is_empty() {
            return Ok(());
        }

        let vector = self.embedder.embed(&entry.query).await?;
        let citations_json =
            serde_json::to_string(&entry.citations).map_err(|e| CoreError::CacheFailure(e.to_string()))?;
        let query_type_json =
            serde_json::to_value(entry.query_type).map_err(|e| CoreError::CacheFailure(e.to_string()))?;

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("query".to_string(), serde_json::json!(entry.query));
        metadata.insert("answer".to_string(), serde_json::json!(entry.answer));
        metadata.insert("citations".to_string(), serde_json::json!(citations_json));
        metadata.insert("query_type".to_string(), query_type_json);
        metadata.insert("trace_id".to_string(), serde_json::json!(entry.trace_id));
        metadata.insert("created_at".to_string(), serde_json::json!(chrono::Utc::now().to_rfc3339()));

        self.vector_index.upsert(&self.namespace, key, vector, metadata).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.vector_index.delete(&self.namespace, &[key.to_string()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_case_and_whitespace() {
        assert_eq!(normalize("  What IS your Return Window?  "), "what is your return window?");
    }

    #[test]
    fn key_is_deterministic_across_casing() {
        let a = sha256_hex(&normalize("Return Window?"));
        let b = sha256_hex(&normalize("return window?"));
        assert_eq!(a, b);
    }
}
