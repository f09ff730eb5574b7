use std::sync::Arc;

use common::{
    model::registry::ModelRegistry,
    retrieval::registry::EngineRegistry,
    storage::{
        db::SurrealDbClient,
        types::{
            knowledge_base::KnowledgeBase,
            message::{KnowledgeReference, Message},
            session::Session,
        },
    },
    stream::manager::StreamManager,
};

use crate::{reranking::RerankerPool, scoring::Scored, sse::SseEvent};

/// Shared, read-only collaborators every stage needs: the database, the
/// model/engine registries built once at startup, and (for the streaming
/// pipeline) the stream manager a producer reports deltas into.
#[derive(Clone)]
pub struct PipelineServices {
    pub db: Arc<SurrealDbClient>,
    pub models: Arc<ModelRegistry>,
    pub engines: Arc<EngineRegistry>,
    pub rerankers: Option<Arc<RerankerPool>>,
    pub streams: Arc<StreamManager>,
}

/// Per-request mutable state threaded through the event executor (SPEC_FULL
/// §4.5's `ChatManage`). Every stage reads what it needs from here and
/// writes its own output field; stages never call each other directly.
pub struct ChatManage {
    pub services: PipelineServices,
    pub session: Session,
    pub kb: KnowledgeBase,
    pub request_id: String,

    /// The query exactly as submitted by the caller.
    pub query: String,
    /// `query` after normalization (`preprocess_query`).
    pub processed_query: String,
    /// `processed_query` after `rewrite_query`, standalone w.r.t. history.
    pub rewrite_query: Option<String>,
    /// Candidate entity mentions extracted by `preprocess_query`, used to
    /// seed `entity_search`.
    pub entity: Vec<String>,

    pub history: Vec<Message>,

    pub query_embedding: Option<Vec<f32>>,

    /// Raw per-(engine, retriever_type) candidates collected by
    /// `chunk_search`, before rerank/merge.
    pub search_result: Vec<Scored<common::retrieval::RetrievalHit>>,
    /// One-hop graph expansion from `entity_search`, folded into the merge.
    pub graph_result: common::retrieval::GraphExpansion,
    /// Reranked, deduplicated candidates after `chunk_rerank`.
    pub rerank_result: Vec<Scored<common::retrieval::RetrievalHit>>,
    /// Final merged, neighbor-enriched context after `chunk_merge` and
    /// `filter_top_k`.
    pub merge_result: Vec<KnowledgeReference>,

    /// Whether retrieval produced nothing usable, set by `filter_top_k`;
    /// downstream stages apply the session's fallback strategy.
    pub no_match: bool,

    /// Rendered prompt built by `into_chat_message`; also persisted onto
    /// the assistant message for audit.
    pub user_content: Option<String>,

    /// Accumulated model output, filled in by `chat_completion_stream`.
    pub chat_response: String,
    pub usage_tokens: Option<u32>,

    /// Set by any stage that fails irrecoverably; short-circuits the
    /// remaining stages straight to `stream_filter`, which emits a terminal
    /// error event.
    pub error: Option<String>,

    /// Producer side of the per-request SSE channel; `None` for the
    /// LLM-less `rag` pipeline (`SearchKnowledge`), which has nothing to
    /// stream.
    pub response_tx: Option<tokio::sync::mpsc::Sender<SseEvent>>,
}

impl ChatManage {
    #[must_use]
    pub fn new(
        services: PipelineServices,
        session: Session,
        kb: KnowledgeBase,
        request_id: String,
        query: String,
        history: Vec<Message>,
        response_tx: Option<tokio::sync::mpsc::Sender<SseEvent>>,
    ) -> Self {
        Self {
            services,
            session,
            kb,
            request_id,
            processed_query: query.clone(),
            query,
            rewrite_query: None,
            entity: Vec::new(),
            history,
            query_embedding: None,
            search_result: Vec::new(),
            graph_result: common::retrieval::GraphExpansion::default(),
            rerank_result: Vec::new(),
            merge_result: Vec::new(),
            no_match: false,
            user_content: None,
            chat_response: String::new(),
            usage_tokens: None,
            error: None,
            response_tx,
        }
    }

    /// Sends an SSE event if a channel is attached; a dropped receiver
    /// (client disconnect) is not fatal, the producer keeps running so the
    /// stream manager still ends up with a complete, reattachable record.
    pub async fn emit(&self, event: SseEvent) {
        if let Some(tx) = &self.response_tx {
            let _ = tx.send(event).await;
        }
    }

    /// The query downstream retrieval stages operate on: `processed_query`
    /// already folds in the rewrite (see `stages::preprocess_query`), so
    /// this is just a convenience accessor.
    #[must_use]
    pub fn effective_query(&self) -> &str {
        &self.processed_query
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }
}
