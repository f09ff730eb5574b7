use crate::pipeline::stage::StageKind;

/// The canonical RAG-stream event list (SPEC_FULL §4.5): full retrieval,
/// rerank, merge, then a streamed chat completion.
pub const RAG_STREAM: &[StageKind] = &[
    StageKind::RewriteQuery,
    StageKind::PreprocessQuery,
    StageKind::ChunkSearch,
    StageKind::EntitySearch,
    StageKind::ChunkRerank,
    StageKind::ChunkMerge,
    StageKind::FilterTopK,
    StageKind::IntoChatMessage,
    StageKind::ChatCompletionStream,
    StageKind::StreamFilter,
];

/// `SearchKnowledge`'s event list: retrieval and merge only, no LLM call,
/// per SPEC_FULL §4.6 ("runs the `rag` pipeline up to `chunk_merge`").
pub const RAG: &[StageKind] = &[
    StageKind::RewriteQuery,
    StageKind::PreprocessQuery,
    StageKind::ChunkSearch,
    StageKind::EntitySearch,
    StageKind::ChunkRerank,
    StageKind::ChunkMerge,
];
