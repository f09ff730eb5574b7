use async_trait::async_trait;
use common::error::AppError;

use crate::pipeline::{
    chat_manage::ChatManage,
    stage::{Stage, StageKind},
};

/// Truncates the merged context to `session.retrieval.rerank_top_k` and
/// flags `no_match` when nothing survived, so downstream stages apply the
/// session's fallback strategy instead of prompting with empty context.
pub struct FilterTopK;

#[async_trait]
impl Stage for FilterTopK {
    fn kind(&self) -> StageKind {
        StageKind::FilterTopK
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        let top_k = ctx.session.retrieval.rerank_top_k as usize;
        if ctx.merge_result.len() > top_k {
            ctx.merge_result.truncate(top_k);
        }
        ctx.no_match = ctx.merge_result.is_empty();
        Ok(())
    }
}
