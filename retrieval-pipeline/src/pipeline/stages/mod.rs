pub mod chat_completion;
pub mod chat_completion_stream;
pub mod chunk_merge;
pub mod chunk_rerank;
pub mod chunk_search;
pub mod entity_search;
pub mod filter_top_k;
pub mod into_chat_message;
pub mod preprocess_query;
pub mod rewrite_query;
pub mod stream_filter;
