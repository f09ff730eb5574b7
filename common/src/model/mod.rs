pub mod chat;
pub mod embed;
pub mod registry;
pub mod rerank;
