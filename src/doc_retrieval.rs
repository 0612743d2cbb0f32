use crate::domain::{Citation, DocChunk, TurnState};
use crate::error::CoreError;
use crate::reranker::CrossEncoder;
use crate::vector::{Embedder, VectorIndex};
use std::sync::Arc;

/// Policy-document retriever: embed the query, pull the top-K₀ nearest
/// chunks from the document namespace, then optionally rerank down to
/// top-N with a cross-encoder (§4.6).
pub struct DocRetriever {
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn CrossEncoder>>,
    namespace: String,
    top_k0: usize,
    top_n: usize,
}

impl DocRetriever {
    pub fn new(
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn CrossEncoder>>,
        namespace: String,
        top_k0: usize,
        top_n: usize,
    ) -> Self {
        Self { vector_index, embedder, reranker, namespace, top_k0, top_n }
    }

    /// Run document retrieval against `turn` in place: no-op unless
    /// `should_retrieve_docs`, embeds and queries, reranks if a cross-encoder
    /// is configured, truncates to `top_n`, and emits one citation per chunk.
    pub async fn retrieve(&self, turn: &mut TurnState) -> Result<(), CoreError> {
        if !turn.should_retrieve_docs {
            return Ok(());
        }

        let vector = self.embedder.embed(&turn.query).await?;
        let matches = self
            .vector_index
            .query(&self.namespace, vector, self.top_k0, None)
            .await?;

        let mut docs: Vec<DocChunk> = matches
            .into_iter()
            .map(|m| {
                let text = m.metadata.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let title = m.metadata.get("title").and_then(|v| v.as_str()).map(str::to_string);
                let source = m.metadata.get("source").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let page = m.metadata.get("page").and_then(|v| v.as_u64()).map(|p| p as u32);
                DocChunk { id: m.id, text, title, source, page, score: m.score }
            })
            .collect();

        if let Some(reranker) = &self.reranker {
            if !docs.is_empty() {
                let pairs: Vec<(String, String)> =
                    docs.iter().map(|d| (turn.query.clone(), d.text.clone())).collect();
                let scores = reranker.score(&pairs).await?;
                for (doc, score) in docs.iter_mut().zip(scores) {
                    doc.score = score;
                }
                docs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            }
        }

        docs.truncate(self.top_n);

        let citations: Vec<Citation> = docs
            .iter()
            .map(|d| Citation {
                source: d.source.clone(),
                title: d.title.clone(),
                page: d.page,
                score: Some(d.score),
            })
            .collect();

        turn.citations.extend(citations);
        turn.docs = docs;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, QueryType};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, CoreError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct FakeVectorIndex {
        matches: Vec<crate::vector::VectorMatch>,
    }

    #[async_trait]
    impl VectorIndex for FakeVectorIndex {
        async fn upsert(
            &self,
            _namespace: &str,
            _id: &str,
            _vector: Vec<f32>,
            _metadata: HashMap<String, serde_json::Value>,
        ) -> Result<(), CoreError> {
            Ok(())
        }

        async fn query(
            &self,
            _namespace: &str,
            _vector: Vec<f32>,
            _top_k: usize,
            _metadata_filter: Option<serde_json::Value>,
        ) -> Result<Vec<crate::vector::VectorMatch>, CoreError> {
            Ok(self.matches.clone())
        }

        async fn delete(&self, _namespace: &str, _ids: &[String]) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn make_match(id: &str, score: f32, text: &str) -> crate::vector::VectorMatch {
        let mut metadata = HashMap::new();
        metadata.insert("text".to_string(), serde_json::json!(text));
        metadata.insert("source".to_string(), serde_json::json!(format!("doc:{}", id)));
        crate::vector::VectorMatch { id: id.to_string(), score, metadata }
    }

    fn make_turn(should_retrieve_docs: bool) -> TurnState {
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
        turn.query_type = Some(QueryType::PolicyOnly);
        turn.should_retrieve_docs = should_retrieve_docs;
        turn
    }

    #[tokio::test]
    async fn skip_when_not_flagged() {
        let retriever = DocRetriever::new(
            Arc::new(FakeVectorIndex { matches: vec![] }),
            Arc::new(FakeEmbedder),
            None,
            "docs".to_string(),
            10,
            3,
        );
        let mut turn = make_turn(false);
        retriever.retrieve(&mut turn).await.unwrap();
        assert!(turn.docs.is_empty());
        assert!(turn.citations.is_empty());
    }

    #[tokio::test]
    async fn truncates_to_top_n_and_emits_citations() {
        let matches = vec![
            make_match("a", 0.9, "returns within 30 days"),
            make_match("b", 0.8, "refunds processed in 5 days"),
            make_match("c", 0.7, "shipping takes 3-5 days"),
            make_match("d", 0.6, "unrelated chunk"),
        ];
        let retriever = DocRetriever::new(
            Arc::new(FakeVectorIndex { matches }),
            Arc::new(FakeEmbedder),
            None,
            "docs".to_string(),
            10,
            3,
        );
        let mut turn = make_turn(true);
        retriever.retrieve(&mut turn).await.unwrap();
        assert_eq!(turn.docs.len(), 3);
        assert_eq!(turn.citations.len(), 3);
        assert_eq!(turn.citations[0].source, "doc:a");
    }
}
