use async_trait::async_trait;
use common::{error::AppError, model::rerank::RerankClient};
use tracing::warn;

use crate::{
    pipeline::{
        chat_manage::ChatManage,
        stage::{Stage, StageKind},
    },
    scoring::sort_by_fused_desc,
};

/// Scores the deduplicated candidate set against the query with the rerank
/// model, when one is configured; otherwise the already-normalized fusion
/// scores from `chunk_search` stand as-is (SPEC_FULL §4.5).
pub struct ChunkRerank;

#[async_trait]
impl Stage for ChunkRerank {
    fn kind(&self) -> StageKind {
        StageKind::ChunkRerank
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        if ctx.search_result.is_empty() {
            ctx.rerank_result = Vec::new();
            return Ok(());
        }

        let Some(rerankers) = ctx.services.rerankers.clone() else {
            ctx.rerank_result = ctx.search_result.clone();
            return Ok(());
        };
        if ctx.kb.rerank_model.is_none() {
            ctx.rerank_result = ctx.search_result.clone();
            return Ok(());
        }

        let documents: Vec<String> = ctx
            .search_result
            .iter()
            .map(|scored| scored.item.entry.content.clone())
            .collect();

        let lease = rerankers.checkout().await;
        let scores = match RerankClient::rerank(&lease, ctx.effective_query(), &documents).await {
            Ok(scores) => scores,
            Err(err) => {
                warn!(error = %err, "chunk_rerank failed, falling back to fused scores");
                ctx.rerank_result = ctx.search_result.clone();
                return Ok(());
            }
        };

        let threshold = ctx.session.retrieval.rerank_threshold;
        let mut reranked: Vec<_> = ctx
            .search_result
            .iter()
            .cloned()
            .zip(scores)
            .filter_map(|(mut scored, score)| {
                if score < threshold {
                    return None;
                }
                scored.update_fused(score);
                Some(scored)
            })
            .collect();

        sort_by_fused_desc(&mut reranked);
        ctx.rerank_result = reranked;
        Ok(())
    }
}
