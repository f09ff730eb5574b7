use async_trait::async_trait;
use common::{
    error::AppError,
    model::chat::{ChatOptions, ChatTurn},
};

use crate::pipeline::{
    chat_manage::ChatManage,
    stage::{Stage, StageKind},
};

/// Non-streaming counterpart of `ChatCompletionStream`, for callers that
/// want the final answer in one shot rather than SSE deltas (SPEC_FULL
/// §4.1's `Chat` operation in its non-stream form). No canonical event list
/// schedules this stage today, but it is a real, independently usable
/// building block rather than dead surface.
pub struct ChatCompletion;

#[async_trait]
impl Stage for ChatCompletion {
    fn kind(&self) -> StageKind {
        StageKind::ChatCompletion
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        if ctx.no_match && ctx.session.retrieval.fallback_strategy
            == common::storage::types::session::FallbackStrategy::Fixed
        {
            ctx.chat_response = ctx.session.generation.no_match_prefix.clone();
            return Ok(());
        }

        let Some(user_content) = ctx.user_content.clone() else {
            return Err(AppError::InternalError(
                "chat_completion ran before into_chat_message".to_string(),
            ));
        };

        let model = ctx.services.models.chat_model(&ctx.kb.chat_model).await;
        let options = ChatOptions {
            temperature: ctx.session.generation.temperature,
            top_p: ctx.session.generation.top_p,
            seed: ctx.session.generation.seed,
            max_tokens: ctx.session.generation.max_tokens,
        };
        let turn = ChatTurn {
            system: Some(ctx.session.generation.prompt_template.clone()),
            user: user_content,
        };

        ctx.chat_response = model.complete(&turn, &options).await?;
        Ok(())
    }
}
