use async_trait::async_trait;
use common::{
    error::AppError,
    model::chat::{ChatOptions, ChatTurn},
};
use futures::StreamExt;
use tracing::warn;

use crate::{
    pipeline::{
        chat_manage::ChatManage,
        stage::{Stage, StageKind},
    },
    sse::SseEvent,
};

/// Streams the summary model's completion, echoing every delta both to the
/// caller's SSE channel and into the `StreamManager` record a late-joining
/// reader would re-attach to. Emits the `references` event first so the
/// client can render sources before any answer text arrives (SPEC_FULL
/// §4.5/§6).
pub struct ChatCompletionStream;

#[async_trait]
impl Stage for ChatCompletionStream {
    fn kind(&self) -> StageKind {
        StageKind::ChatCompletionStream
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        ctx.emit(SseEvent::references(&ctx.request_id, ctx.merge_result.clone()))
            .await;
        if let Err(err) = ctx
            .services
            .streams
            .update_stream(&ctx.session.id, &ctx.request_id, "", Some(ctx.merge_result.clone()))
            .await
        {
            warn!(error = %err, "failed to record references on stream manager");
        }

        if ctx.no_match && ctx.session.retrieval.fallback_strategy
            == common::storage::types::session::FallbackStrategy::Fixed
        {
            let fallback = ctx.session.generation.no_match_prefix.clone();
            ctx.chat_response.push_str(&fallback);
            ctx.emit(SseEvent::answer_delta(&ctx.request_id, &fallback)).await;
            if let Err(err) = ctx
                .services
                .streams
                .update_stream(&ctx.session.id, &ctx.request_id, &fallback, None)
                .await
            {
                warn!(error = %err, "failed to record fallback answer on stream manager");
            }
            return Ok(());
        }

        let Some(user_content) = ctx.user_content.clone() else {
            return Err(AppError::InternalError(
                "chat_completion_stream ran before into_chat_message".to_string(),
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

        let mut stream = model.stream_complete(&turn, &options).await?;
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            if let Some(usage_tokens) = delta.usage_tokens {
                ctx.usage_tokens = Some(usage_tokens);
            }
            if delta.text.is_empty() {
                continue;
            }
            ctx.chat_response.push_str(&delta.text);
            ctx.emit(SseEvent::answer_delta(&ctx.request_id, &delta.text)).await;
            if let Err(err) = ctx
                .services
                .streams
                .update_stream(&ctx.session.id, &ctx.request_id, &delta.text, None)
                .await
            {
                warn!(error = %err, "failed to record delta on stream manager");
            }
        }

        Ok(())
    }
}
