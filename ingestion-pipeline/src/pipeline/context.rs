use std::sync::Arc;

use bytes::Bytes;
use common::{
    error::AppError,
    model::registry::ModelRegistry,
    retrieval::registry::EngineRegistry,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{
            chunk::{Chunk, ImageInfo},
            graph_entity::GraphEntity,
            index_entry::IndexEntry,
            knowledge::Knowledge,
            knowledge_base::KnowledgeBase,
        },
    },
};
use tracing::error;

use crate::{graph_extract::RelationshipDraft, parser::ParserService, pipeline::config::IngestionTuning};

/// Shared, read-only collaborators every stage needs, built once at startup
/// and handed down by the driver (mirrors `retrieval_pipeline::pipeline::
/// chat_manage::PipelineServices`).
#[derive(Clone)]
pub struct PipelineServices {
    pub db: Arc<SurrealDbClient>,
    pub models: Arc<ModelRegistry>,
    pub engines: Arc<EngineRegistry>,
    pub storage: StorageManager,
    pub parser: Arc<dyn ParserService>,
}

/// Per-task mutable state threaded through the stage functions (SPEC_FULL
/// §4.4). Each stage reads what it needs and writes its own output field,
/// the same shape as the source crate's `PipelineContext`.
pub struct IngestionContext<'a> {
    pub services: &'a PipelineServices,
    pub tuning: &'a IngestionTuning,
    pub task_id: String,
    pub attempt: u32,

    pub kb: KnowledgeBase,
    pub knowledge: Knowledge,
    /// Raw bytes for a `File` source, held only long enough to parse.
    pub raw_bytes: Option<Bytes>,

    pub text: Option<String>,
    pub images: Vec<ImageInfo>,
    pub chunks: Vec<Chunk>,
    pub graph_entities: Vec<GraphEntity>,
    pub relationships: Vec<RelationshipDraft>,
    pub index_entries: Vec<IndexEntry>,
}

impl<'a> IngestionContext<'a> {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        services: &'a PipelineServices,
        tuning: &'a IngestionTuning,
        task_id: String,
        attempt: u32,
        kb: KnowledgeBase,
        knowledge: Knowledge,
        raw_bytes: Option<Bytes>,
    ) -> Self {
        Self {
            services,
            tuning,
            task_id,
            attempt,
            kb,
            knowledge,
            raw_bytes,
            text: None,
            images: Vec::new(),
            chunks: Vec::new(),
            graph_entities: Vec::new(),
            relationships: Vec::new(),
            index_entries: Vec::new(),
        }
    }

    pub fn text(&self) -> Result<&str, AppError> {
        self.text
            .as_deref()
            .ok_or_else(|| AppError::InternalError("parse stage did not populate text".into()))
    }

    /// Logs and passes the error through unchanged; called from `map_err` so
    /// a stage failure is always attributed to its owning task before it
    /// propagates to the driver's retry logic.
    pub fn abort(&self, err: AppError) -> AppError {
        error!(
            task_id = %self.task_id,
            attempt = self.attempt,
            knowledge_id = %self.knowledge.id,
            error = %err,
            "ingestion stage failed"
        );
        err
    }
}
