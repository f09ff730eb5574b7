use std::time::Duration;

use tracing::warn;

use crate::pipeline::{
    chat_manage::ChatManage,
    stage::{BoxedStage, Stage, StageKind},
    stages::{
        chat_completion::ChatCompletion, chat_completion_stream::ChatCompletionStream,
        chunk_merge::ChunkMerge, chunk_rerank::ChunkRerank, chunk_search::ChunkSearch,
        entity_search::EntitySearch, filter_top_k::FilterTopK,
        into_chat_message::IntoChatMessage, preprocess_query::PreprocessQuery,
        rewrite_query::RewriteQuery, stream_filter::StreamFilter,
    },
};

fn build_stage(kind: StageKind) -> BoxedStage {
    match kind {
        StageKind::RewriteQuery => Box::new(RewriteQuery),
        StageKind::PreprocessQuery => Box::new(PreprocessQuery),
        StageKind::ChunkSearch => Box::new(ChunkSearch),
        StageKind::EntitySearch => Box::new(EntitySearch),
        StageKind::ChunkRerank => Box::new(ChunkRerank),
        StageKind::ChunkMerge => Box::new(ChunkMerge),
        StageKind::FilterTopK => Box::new(FilterTopK),
        StageKind::IntoChatMessage => Box::new(IntoChatMessage),
        StageKind::ChatCompletionStream => Box::new(ChatCompletionStream),
        StageKind::StreamFilter => Box::new(StreamFilter),
        StageKind::ChatCompletion => Box::new(ChatCompletion),
    }
}

/// Runs a named event list against `ctx`, honoring the per-stage soft
/// timeout (SPEC_FULL §5). A stage failure — including a timeout — sets
/// `ChatManage::error` and short-circuits straight to `stream_filter`
/// rather than running the remaining stages, so a streaming caller still
/// gets a terminal event instead of a hung connection.
pub struct PipelineDriver {
    stage_timeout: Duration,
}

impl PipelineDriver {
    #[must_use]
    pub fn new(stage_timeout: Duration) -> Self {
        Self { stage_timeout }
    }

    pub async fn run(&self, event_list: &[StageKind], ctx: &mut ChatManage) {
        let mut stream_filter_ran = false;

        for &kind in event_list {
            if ctx.error.is_some() {
                break;
            }

            let stage = build_stage(kind);
            let outcome = tokio::time::timeout(self.stage_timeout, stage.run(ctx)).await;

            if kind == StageKind::StreamFilter {
                stream_filter_ran = true;
            }

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(stage = kind.name(), error = %err, "pipeline stage failed");
                    ctx.fail(err.to_string());
                }
                Err(_) => {
                    warn!(stage = kind.name(), "pipeline stage timed out");
                    ctx.fail(format!("stage '{}' timed out", kind.name()));
                }
            }
        }

        if ctx.error.is_some() && !stream_filter_ran {
            let _ = StreamFilter.run(ctx).await;
        }
    }
}
