use std::sync::Arc;

use common::{
    model::registry::ModelRegistry,
    retrieval::registry::EngineRegistry,
    stream::manager::StreamManager,
    storage::{db::SurrealDbClient, store::StorageManager},
    task::queue::TaskQueue,
    utils::config::AppConfig,
};
use retrieval_pipeline::{reranking::RerankerPool, PipelineServices};

/// Shared collaborators every route handler reads from. Built once in
/// `main` and handed in by construction so a test can swap in an in-memory
/// db/storage without this crate reaching out to connect anything itself.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub models: Arc<ModelRegistry>,
    pub engines: Arc<EngineRegistry>,
    pub rerankers: Option<Arc<RerankerPool>>,
    pub streams: Arc<StreamManager>,
    pub task_queue: Arc<TaskQueue>,
}

impl ApiState {
    /// Builds the collaborator bundle the query pipeline expects, cloning
    /// only `Arc`s — cheap enough to call once per request.
    #[must_use]
    pub fn pipeline_services(&self) -> PipelineServices {
        PipelineServices {
            db: self.db.clone(),
            models: self.models.clone(),
            engines: self.engines.clone(),
            rerankers: self.rerankers.clone(),
            streams: self.streams.clone(),
        }
    }
}
