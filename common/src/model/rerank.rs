use async_trait::async_trait;

use crate::error::AppError;

/// Capability contract for a rerank model: score `documents` against `query`
/// and return one score per document, same order as input. Implemented by
/// `retrieval-pipeline::reranking::RerankerLease`; kept here so the trait
/// lives alongside the other model contracts rather than in the pipeline
/// crate that happens to own the pool's lifecycle.
#[async_trait]
pub trait RerankClient: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, AppError>;
}
