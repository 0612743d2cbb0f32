use crate::domain::TurnState;
use crate::error::best_effort;
use crate::generation;
use crate::groundedness;
use crate::llm::LlmClient;
use crate::retrieval::Retriever;
use crate::router;
use crate::semantic_cache::SemanticCache;
use std::sync::Arc;

const DEFAULT_ESCALATION_REASON: &str = "User requested human assistance.";

/// Step coordinator for a single turn. The source expresses this as a
/// LangGraph state machine with conditional edges (router -> cache_check
/// -> parallel_retrieve|generate -> groundedness -> generate|END); here it's
/// a plain sequential function with one explicit retry loop, since there is
/// no other branching the driver needs to observe mid-turn.
pub struct Graph {
    llm: Arc<dyn LlmClient>,
    model: String,
    semantic_cache: Option<Arc<SemanticCache>>,
    retriever: Arc<Retriever>,
    db_available: bool,
    recent_window: usize,
}

impl Graph {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: String,
        semantic_cache: Option<Arc<SemanticCache>>,
        retriever: Arc<Retriever>,
        db_available: bool,
        recent_window: usize,
    ) -> Self {
        Self { llm, model, semantic_cache, retriever, db_available, recent_window }
    }

    /// Run router -> cache probe -> retrieval -> generation -> groundedness
    /// (with at most one generation retry) against `turn` in place.
    pub async fn run(&self, turn: &mut TurnState) {
        let routed = router::classify(&turn.query, self.db_available, self.llm.as_ref(), &self.model).await;
        turn.query_type = Some(routed.query_type);
        turn.should_retrieve_sql = routed.should_retrieve_sql;
        turn.should_retrieve_docs = routed.should_retrieve_docs;
        turn.should_escalate = routed.should_escalate;
        turn.order_id = routed.order_id;
        if routed.should_escalate {
            turn.escalation_reason = Some(DEFAULT_ESCALATION_REASON.to_string());
        }

        if let Some(cache) = &self.semantic_cache {
            if turn.should_retrieve_docs && !turn.should_retrieve_sql {
                turn.cache_key = Some(cache.key(&turn.query));
                let hit = best_effort("semantic_cache", None, cache.similar(&turn.query)).await;
                if let Some(entry) = hit {
                    turn.answer = entry.answer;
                    turn.citations = entry.citations;
                    turn.trace_id = entry.trace_id;
                    turn.cache_hit = true;
                    return;
                }
                turn.should_cache = true;
            }
        }

        if turn.should_retrieve_docs || turn.should_retrieve_sql {
            best_effort("retrieval", (), self.retriever.retrieve(turn)).await;
        }

        generation::generate(self.llm.as_ref(), &self.model, turn, self.recent_window, None).await;

        if !turn.docs.is_empty() {
            loop {
                let retry = groundedness::judge(self.llm.as_ref(), &self.model, turn).await;
                if !retry {
                    break;
                }
                let feedback = turn.grounded_explanation.clone();
                generation::generate(self.llm.as_ref(), &self.model, turn, self.recent_window, feedback.as_deref())
                    .await;
            }
        }

        if let Some(cache) = &self.semantic_cache {
            best_effort("semantic_cache_writeback", (), generation::write_back_cache(cache, turn)).await;
        }
    }
}
