use async_trait::async_trait;
use common::{
    error::AppError,
    retrieval::{RetrieveParams, RetrieverType},
    storage::types::knowledge_base::RetrievalBackendKind,
};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::warn;

use crate::{
    pipeline::{
        chat_manage::ChatManage,
        stage::{Stage, StageKind},
    },
    scoring::{merge_hits_by_chunk_id, sort_by_fused_desc, FusionWeights},
};

fn engine_type_for(kind: RetrievalBackendKind) -> Option<&'static str> {
    match kind {
        RetrievalBackendKind::Relational => Some("surreal_relational"),
        RetrievalBackendKind::InvertedIndex => Some("tantivy_inverted_index"),
        RetrievalBackendKind::Graph => None,
    }
}

/// Issues the vector and keyword retrievals for the KB's configured engine
/// in parallel, with per-`(engine, retriever_type)` error isolation: one
/// failing call is logged and dropped, it never aborts the other (SPEC_FULL
/// §4.5). Results are fused into one ranked candidate list per chunk.
pub struct ChunkSearch;

#[async_trait]
impl Stage for ChunkSearch {
    fn kind(&self) -> StageKind {
        StageKind::ChunkSearch
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        let Some(engine_type) = engine_type_for(ctx.kb.backend) else {
            return Ok(());
        };
        let Some(engine) = ctx.services.engines.get(engine_type) else {
            warn!(engine_type, "configured retrieval engine not registered");
            return Ok(());
        };

        if ctx.query_embedding.is_none() {
            let embed_model = ctx
                .services
                .models
                .embed_model(&ctx.kb.embedding_model, ctx.kb.embedding_dimension);
            if let Some(embed_model) = embed_model {
                match embed_model.embed(ctx.effective_query()).await {
                    Ok(embedding) => ctx.query_embedding = Some(embedding),
                    Err(err) => warn!(error = %err, "query embedding failed, vector search skipped"),
                }
            }
        }

        let kb_ids = vec![ctx.kb.id.clone()];
        let retriever_types = [RetrieverType::Vector, RetrieverType::Keywords];

        let mut tasks = FuturesUnordered::new();
        for retriever_type in retriever_types {
            if !engine.supports(retriever_type) {
                continue;
            }
            if retriever_type == RetrieverType::Vector && ctx.query_embedding.is_none() {
                continue;
            }

            let engine = engine.clone();
            let params = RetrieveParams {
                query_text: ctx.processed_query.clone(),
                embedding: ctx.query_embedding.clone(),
                kb_ids: kb_ids.clone(),
                exclude_knowledge_ids: Vec::new(),
                exclude_chunk_ids: Vec::new(),
                top_k: match retriever_type {
                    RetrieverType::Vector => ctx.session.retrieval.vector_top_k,
                    RetrieverType::Keywords => ctx.session.retrieval.keyword_top_k,
                },
                threshold: match retriever_type {
                    RetrieverType::Vector => ctx.session.retrieval.vector_threshold,
                    RetrieverType::Keywords => ctx.session.retrieval.keyword_threshold,
                },
                retriever_type,
            };

            tasks.push(async move {
                let hits = engine.retrieve(&params).await;
                (retriever_type, hits)
            });
        }

        let mut collected = Vec::new();
        while let Some((retriever_type, result)) = tasks.next().await {
            match result {
                Ok(hits) => collected.extend(hits.into_iter().map(|hit| (retriever_type, hit))),
                Err(err) => warn!(error = %err, ?retriever_type, "chunk_search sub-task failed"),
            }
        }

        let mut fused = merge_hits_by_chunk_id(collected, FusionWeights::default());
        sort_by_fused_desc(&mut fused);
        ctx.search_result = fused;

        Ok(())
    }
}
