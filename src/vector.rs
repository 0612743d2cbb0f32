use crate::error::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Capability contract for the vector database (§6). Namespaces separate the
/// document-policy collection from the semantic-cache collection within the
/// same backend.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        namespace: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), CoreError>;

    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
        metadata_filter: Option<serde_json::Value>,
    ) -> Result<Vec<VectorMatch>, CoreError>;

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<(), CoreError>;
}

/// Capability contract for the embedding model (§6): a fixed-dimension
/// vector for a piece of text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;
}

/// Qdrant-backed [`VectorIndex`]. Namespaces map to Qdrant collections,
/// created lazily on first use since Qdrant has no implicit collection
/// creation.
pub struct QdrantVectorIndex {
    client: reqwest::Client,
    base_url: String,
    vector_size: usize,
}

impl QdrantVectorIndex {
    pub fn new(base_url: String, vector_size: usize, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url, vector_size }
    }

    pub async fn ensure_collection(&self, namespace: &str) -> Result<(), CoreError> {
        let check_url = format!("{}/collections/{}", self.base_url, namespace);
        let check = self
            .client
            .get(&check_url)
            .send()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        if check.status().is_success() {
            return Ok(());
        }

        let body = serde_json::json!({
            "vectors": { "size": self.vector_size, "distance": "Cosine" }
        });

        let response = self
            .client
            .put(&check_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(CoreError::RetrievalFailure(format!("failed to create collection: {}", error)));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(
        &self,
        namespace: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), CoreError> {
        let url = format!("{}/collections/{}/points", self.base_url, namespace);
        let body = serde_json::json!({
            "points": [{ "id": id, "vector": vector, "payload": metadata }]
        });

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(CoreError::RetrievalFailure(format!("qdrant upsert failed: {}", error)));
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
        metadata_filter: Option<serde_json::Value>,
    ) -> Result<Vec<VectorMatch>, CoreError> {
        let url = format!("{}/collections/{}/points/search", self.base_url, namespace);
        let mut body = serde_json::json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(filter) = metadata_filter {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(CoreError::RetrievalFailure(format!("qdrant search failed: {}", error)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        let results = json["result"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| {
                        Some(VectorMatch {
                            id: item["id"].as_str()?.to_string(),
                            score: item["score"].as_f64()? as f32,
                            metadata: serde_json::from_value(item["payload"].clone()).unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(results)
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<(), CoreError> {
        let url = format!("{}/collections/{}/points/delete", self.base_url, namespace);
        let body = serde_json::json!({ "points": ids });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(CoreError::RetrievalFailure(format!("qdrant delete failed: {}", error)));
        }
        Ok(())
    }
}

/// Ollama-backed [`Embedder`], optionally with a write-through Redis cache so
/// repeated embeddings of the same text skip the model call.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    host: String,
    model: String,
    cache: Option<redis::aio::ConnectionManager>,
}

impl OllamaEmbedder {
    pub fn new(
        host: String,
        model: String,
        cache: Option<redis::aio::ConnectionManager>,
        timeout: std::time::Duration,
    ) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_else(|_| reqwest::Client::new());
        Self { client, host, model, cache }
    }

    fn cache_key(text: &str) -> String {
        format!("emb:{}", crate::ids::sha256_hex(text))
    }

    async fn cached(&self, text: &str) -> Option<Vec<f32>> {
        let cache = self.cache.as_ref()?;
        let mut con = cache.clone();
        let encoded: Option<String> = redis::cmd("GET")
            .arg(Self::cache_key(text))
            .query_async(&mut con)
            .await
            .ok()?;
        let encoded = encoded?;
        decode_embedding(&encoded)
    }

    async fn store_cached(&self, text: &str, embedding: &[f32]) {
        let Some(cache) = self.cache.as_ref() else { return };
        let mut con = cache.clone();
        let encoded = encode_embedding(embedding);
        let _ = redis::cmd("SET")
            .arg(Self::cache_key(text))
            .arg(encoded)
            .arg("EX")
            .arg(604_800)
            .query_async::<_, ()>(&mut con)
            .await;
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        if let Some(cached) = self.cached(text).await {
            return Ok(cached);
        }

        let url = format!("{}/api/embeddings", self.host);
        let body = serde_json::json!({ "model": self.model, "prompt": text });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(CoreError::RetrievalFailure(format!("ollama embeddings failed: {}", error)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::RetrievalFailure(e.to_string()))?;

        let embedding: Vec<f32> = json["embedding"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
            .ok_or_else(|| CoreError::RetrievalFailure("ollama returned no embedding".to_string()))?;

        self.store_cached(text, &embedding).await;
        Ok(embedding)
    }
}

/// Deterministic hash-based embedder. NOT a production fallback — real
/// embedder failures propagate as `CoreError::RetrievalFailure` and are
/// swallowed by callers via [`crate::error::best_effort`]. Exists purely so
/// tests and offline demos can exercise the retrieval/cache paths without a
/// running Ollama instance.
pub struct HashFallbackEmbedder {
    pub dimension: usize,
}

#[async_trait]
impl Embedder for HashFallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = hasher.finalize();

        let mut embedding = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let byte = hash[i % 32] as f32;
            embedding.push((byte / 255.0) * 2.0 - 1.0);
        }
        Ok(embedding)
    }
}

fn encode_embedding(embedding: &[f32]) -> String {
    use base64::Engine;
    let bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn decode_embedding(encoded: &str) -> Option<Vec<f32>> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
