use std::sync::Arc;

use redis::Client as RedisClient;
use sqlx::postgres::PgPoolOptions;
use support_core::archival_store::{ArchivalStore, PostgresArchivalStore};
use support_core::auth::{AdminBypassAgentAuth, AgentAuth, PostgresAgentAuth};
use support_core::config::Config;
use support_core::doc_retrieval::DocRetriever;
use support_core::driver::ChatDriver;
use support_core::graph::Graph;
use support_core::http;
use support_core::llm::{HttpLlmClient, LlmClient};
use support_core::notification::{NotificationSink, WebhookNotificationSink};
use support_core::reranker::{CrossEncoder, HttpCrossEncoder};
use support_core::retrieval::Retriever;
use support_core::semantic_cache::SemanticCache;
use support_core::session_store::{RedisSessionStore, SessionStore};
use support_core::sql_retrieval::{self, PostgresSqlRetriever, SqlRetriever};
use support_core::vector::{Embedder, OllamaEmbedder, QdrantVectorIndex, VectorIndex};
use support_core::CoreState;

const DOC_NAMESPACE: &str = "support_docs";

#[tokio::main]
async fn main() {
    dotenvy::from_path(".env").ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    tracing::info!("connecting to redis...");
    let redis_client = RedisClient::open(config.redis_url.clone()).expect("failed to build redis client");
    let redis_conn = redis_client
        .get_connection_manager()
        .await
        .expect("failed to connect to redis");
    tracing::info!("connected to redis");

    let session_store: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(
        redis_conn.clone(),
        config.recent_messages_window,
        config.session_ttl_days,
        config.session_store_timeout,
    ));

    let db_pool = match &config.database_url {
        Some(url) => {
            tracing::info!("connecting to postgres...");
            match PgPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(config.db_timeout)
                .connect(url)
                .await
            {
                Ok(pool) => {
                    if let Err(e) = sql_retrieval::init_schema(&pool).await {
                        tracing::error!("failed to initialize sql retrieval schema: {}", e);
                    }
                    if let Err(e) = PostgresArchivalStore::init_schema(&pool).await {
                        tracing::error!("failed to initialize archival schema: {}", e);
                    }
                    if let Err(e) = PostgresAgentAuth::init_schema(&pool).await {
                        tracing::error!("failed to initialize agent auth schema: {}", e);
                    }
                    tracing::info!("connected to postgres");
                    Some(pool)
                }
                Err(e) => {
                    tracing::warn!("could not connect to postgres, SQL retrieval and archival disabled: {}", e);
                    None
                }
            }
        }
        None => {
            tracing::warn!("DATABASE_URL not set, SQL retrieval and archival disabled");
            None
        }
    };

    let archival_store: Option<Arc<dyn ArchivalStore>> =
        db_pool.clone().map(|pool| Arc::new(PostgresArchivalStore::new(pool)) as Arc<dyn ArchivalStore>);

    let agent_auth: Option<Arc<dyn AgentAuth>> = db_pool.clone().map(|pool| {
        let base = PostgresAgentAuth::new(pool);
        Arc::new(AdminBypassAgentAuth::new(base, config.admin_email.clone(), config.admin_passcode.clone()))
            as Arc<dyn AgentAuth>
    });

    let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(
        config.ollama_host.clone(),
        "nomic-embed-text".to_string(),
        Some(redis_conn.clone()),
        config.embed_timeout,
    ));

    let qdrant =
        QdrantVectorIndex::new(config.qdrant_url.clone(), config.embedding_dimension, config.vector_timeout);
    if let Err(e) = qdrant.ensure_collection(DOC_NAMESPACE).await {
        tracing::warn!("could not ensure qdrant document collection: {}", e);
    }
    if let Err(e) = qdrant.ensure_collection(&config.semantic_cache_namespace).await {
        tracing::warn!("could not ensure qdrant semantic-cache collection: {}", e);
    }
    let vector_index: Arc<dyn VectorIndex> = Arc::new(qdrant);

    let reranker: Option<Arc<dyn CrossEncoder>> = config.reranker_url.clone().map(|url| {
        Arc::new(HttpCrossEncoder::new(url, config.vector_timeout)) as Arc<dyn CrossEncoder>
    });

    let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(config.ollama_host.clone(), config.llm_timeout));

    let notification_sink: Arc<dyn NotificationSink> = Arc::new(WebhookNotificationSink::new(
        config.notification_webhook_url.clone(),
        config.notification_bot_token.clone(),
        config.notification_channel_id.clone(),
        config.notification_timeout,
    ));

    let doc_retriever = Arc::new(DocRetriever::new(
        vector_index.clone(),
        embedder.clone(),
        reranker,
        DOC_NAMESPACE.to_string(),
        config.doc_retrieval_top_k,
        config.doc_retrieval_top_n,
    ));

    let sql_retriever: Option<Arc<dyn SqlRetriever>> =
        db_pool.clone().map(|pool| Arc::new(PostgresSqlRetriever::new(pool)) as Arc<dyn SqlRetriever>);

    let retriever = Arc::new(Retriever::new(doc_retriever, sql_retriever));

    let semantic_cache = Some(Arc::new(SemanticCache::new(
        vector_index.clone(),
        embedder.clone(),
        config.semantic_cache_namespace.clone(),
        config.semantic_cache_similarity_threshold,
        config.semantic_cache_top_k,
    )));

    let graph = Arc::new(Graph::new(
        llm.clone(),
        config.chat_model.clone(),
        semantic_cache,
        retriever,
        db_pool.is_some(),
        config.recent_messages_window,
    ));

    let driver = Arc::new(ChatDriver::new(
        session_store.clone(),
        archival_store.clone(),
        notification_sink,
        graph,
        llm,
        config.chat_model.clone(),
        config.session_summary_min_messages,
        config.session_summary_history_limit,
        config.session_summary_max_chars,
    ));

    let state = Arc::new(CoreState {
        driver,
        session_store,
        archival_store,
        agent_auth,
        config: Arc::new(config),
    });

    let app = http::build_router(state);

    tracing::info!("listening on 0.0.0.0:3000");
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("failed to bind to 0.0.0.0:3000");

    axum::serve(listener, app).await.expect("server error");
}
