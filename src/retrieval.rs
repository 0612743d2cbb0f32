use crate::doc_retrieval::DocRetriever;
use crate::domain::TurnState;
use crate::error::{best_effort, CoreError};
use crate::sql_retrieval::{self, SqlRetriever};
use std::sync::Arc;

/// Fans retrieval out into two cooperative, independently-mutating copies of
/// the turn state and merges the results back (§4.7). Each branch runs
/// without a cache handle in scope — there is none carried on `TurnState`
/// itself, so nothing needs to be stripped or restored, unlike the source's
/// `semantic_cache` attribute dance.
pub struct Retriever {
    doc_retriever: Arc<DocRetriever>,
    sql_retriever: Option<Arc<dyn SqlRetriever>>,
}

impl Retriever {
    pub fn new(doc_retriever: Arc<DocRetriever>, sql_retriever: Option<Arc<dyn SqlRetriever>>) -> Self {
        Self { doc_retriever, sql_retriever }
    }

    /// Run SQL and document retrieval concurrently against independent
    /// forks of `turn`, then merge: citations are docs-first then DB-facts,
    /// name fields hydrate from the SQL branch, and failures on either side
    /// are swallowed to an empty result rather than aborting the turn.
    pub async fn retrieve(&self, turn: &mut TurnState) -> Result<(), CoreError> {
        if !turn.should_retrieve_docs && !turn.should_retrieve_sql {
            return Ok(());
        }

        let mut docs_fork = turn.fork();
        let mut sql_fork = turn.fork();

        let run_docs_flag = turn.should_retrieve_docs;
        let run_sql_flag = turn.should_retrieve_sql;

        let docs_task = async {
            if !run_docs_flag {
                return docs_fork;
            }
            best_effort("doc_retrieval", (), self.doc_retriever.retrieve(&mut docs_fork)).await;
            docs_fork
        };

        let sql_task = async {
            if !run_sql_flag {
                return sql_fork;
            }
            if let Some(retriever) = &self.sql_retriever {
                best_effort("sql_retrieval", (), sql_retrieval::retrieve(retriever.as_ref(), &mut sql_fork)).await;
            }
            sql_fork
        };

        let (docs_result, sql_result) = tokio::join!(docs_task, sql_task);

        turn.docs = docs_result.docs;
        turn.sql_rows = sql_result.sql_rows;

        if turn.first_name.is_none() {
            turn.first_name = sql_result.first_name;
        }
        if turn.last_name.is_none() {
            turn.last_name = sql_result.last_name;
        }

        let mut citations = docs_result.citations;
        citations.extend(sql_result.citations);
        turn.citations = citations;

        Ok(())
    }
}
