use async_trait::async_trait;

use crate::pipeline::chat_manage::ChatManage;

/// One stage name from SPEC_FULL §4.5's event list. A tagged union rather
/// than a dynamic registry keyed by string — `Stage::run` dispatch is
/// exhaustive-matched at compile time, so adding a new stage without
/// implementing it is a compile error, not a silent no-op at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    RewriteQuery,
    PreprocessQuery,
    ChunkSearch,
    EntitySearch,
    ChunkRerank,
    ChunkMerge,
    FilterTopK,
    IntoChatMessage,
    ChatCompletion,
    ChatCompletionStream,
    StreamFilter,
}

impl StageKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            StageKind::RewriteQuery => "rewrite_query",
            StageKind::PreprocessQuery => "preprocess_query",
            StageKind::ChunkSearch => "chunk_search",
            StageKind::EntitySearch => "entity_search",
            StageKind::ChunkRerank => "chunk_rerank",
            StageKind::ChunkMerge => "chunk_merge",
            StageKind::FilterTopK => "filter_top_k",
            StageKind::IntoChatMessage => "into_chat_message",
            StageKind::ChatCompletion => "chat_completion",
            StageKind::ChatCompletionStream => "chat_completion_stream",
            StageKind::StreamFilter => "stream_filter",
        }
    }
}

/// Contract every pipeline stage satisfies: mutate `ChatManage` in place,
/// returning an error only when the stage cannot proceed at all (an error
/// here still runs the remaining stages — the executor downgrades it to
/// `ChatManage::error` and short-circuits to `stream_filter` rather than
/// aborting the request outright).
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), common::error::AppError>;
}

pub type BoxedStage = Box<dyn Stage>;
