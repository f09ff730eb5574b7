use async_trait::async_trait;
use common::{
    error::AppError,
    model::chat::{ChatOptions, ChatTurn},
    storage::types::message::format_history,
};
use tracing::warn;

use crate::pipeline::{
    chat_manage::ChatManage,
    stage::{Stage, StageKind},
};

const REWRITE_SYSTEM_PROMPT: &str = "Rewrite the user's latest question into a standalone \
question that can be understood without the conversation history. Preserve intent and \
named entities. Reply with only the rewritten question.";

/// Turns a follow-up question ("what about the second one?") into something
/// `chunk_search` can embed/search on its own. Best-effort: a rewrite
/// failure is not fatal, the pipeline just proceeds on the original query.
pub struct RewriteQuery;

#[async_trait]
impl Stage for RewriteQuery {
    fn kind(&self) -> StageKind {
        StageKind::RewriteQuery
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        if !ctx.session.retrieval.enable_rewrite || ctx.history.is_empty() {
            return Ok(());
        }

        let max_rounds = ctx.session.retrieval.max_rounds.max(1) as usize;
        let recent: Vec<_> = ctx
            .history
            .iter()
            .rev()
            .take(max_rounds * 2)
            .rev()
            .cloned()
            .collect();

        let model = ctx.services.models.chat_model(&ctx.session.summary_model).await;
        let turn = ChatTurn {
            system: Some(REWRITE_SYSTEM_PROMPT.to_string()),
            user: format!("{}\n\nLatest question: {}", format_history(&recent), ctx.query),
        };

        match model.complete(&turn, &ChatOptions::default()).await {
            Ok(rewritten) => {
                let rewritten = rewritten.trim();
                if !rewritten.is_empty() {
                    ctx.rewrite_query = Some(rewritten.to_string());
                }
            }
            Err(err) => {
                warn!(error = %err, "query rewrite failed, falling back to original query");
            }
        }

        Ok(())
    }
}
