mod config;
mod context;
mod stages;
mod state;

pub use config::{IngestionConfig, IngestionTuning};
pub use context::{IngestionContext, PipelineServices};
pub use state::{validated, IngestionMachine};

use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, warn};

use common::{
    error::AppError,
    retrieval::CopyIdMaps,
    storage::types::{
        chunk::Chunk,
        index_entry::IndexEntry,
        knowledge::{Knowledge, KnowledgeSource},
        knowledge_base::{KnowledgeBase, RetrievalBackendKind},
        tenant::Tenant,
    },
    task::queue::{Task, TaskKind, TaskQueue, TaskStatus},
};

/// Which registered `RetrievalBackend` a KB's chunks are indexed into. Kept
/// in sync with the identical mapping in `stages::index` — a `Graph`-backed
/// KB has no vector/keyword engine to copy entries into.
fn engine_type_for(backend: RetrievalBackendKind) -> Option<&'static str> {
    match backend {
        RetrievalBackendKind::Relational => Some("surreal_relational"),
        RetrievalBackendKind::InvertedIndex => Some("tantivy_inverted_index"),
        RetrievalBackendKind::Graph => None,
    }
}

const COPY_BATCH_SIZE: u32 = 500;

use self::stages::{chunk, embed, enrich, finalize, index, parse};

/// Drives an `IngestionMachine` task end to end (SPEC_FULL §4.4), pulled
/// from a `TaskQueue` lane by `crate::run_worker_loop`.
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    services: PipelineServices,
    queue: std::sync::Arc<TaskQueue>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        services: PipelineServices,
        queue: std::sync::Arc<TaskQueue>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            services,
            queue,
            config,
        }
    }

    #[tracing::instrument(skip_all, fields(task_id = %task.id, kind = ?task.kind))]
    pub async fn process_task(&self, task: Task) -> Result<(), AppError> {
        let outcome = match task.kind {
            TaskKind::ChunkExtract | TaskKind::LargeIngest => self.drive_from_task(&task).await,
            TaskKind::IndexCopy => self.drive_copy_task(&task).await,
        };
        match outcome {
            Ok(()) => {
                self.queue.complete(&task.id).await?;
                info!(task_id = %task.id, "ingestion task succeeded");
                Ok(())
            }
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "ingestion task failed");
                self.queue.fail(&task, err.to_string()).await?;
                Err(err)
            }
        }
    }

    fn attempt_of(task: &Task) -> u32 {
        match &task.status {
            TaskStatus::InProgress { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    fn payload_field<'a>(payload: &'a Value, field: &str) -> Result<&'a str, AppError> {
        payload
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Validation(format!("task payload missing '{field}'")))
    }

    async fn load_knowledge_base(&self, kb_id: &str) -> Result<KnowledgeBase, AppError> {
        self.services
            .db
            .get_item(kb_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("knowledge base {kb_id} not found")))
    }

    async fn load_knowledge(&self, knowledge_id: &str) -> Result<Knowledge, AppError> {
        self.services
            .db
            .get_item(knowledge_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("knowledge {knowledge_id} not found")))
    }

    async fn drive_from_task(&self, task: &Task) -> Result<(), AppError> {
        let knowledge_id = Self::payload_field(&task.payload, "knowledge_id")?;
        let kb_id = Self::payload_field(&task.payload, "kb_id")?;

        let kb = self.load_knowledge_base(kb_id).await?;
        let mut knowledge = self.load_knowledge(knowledge_id).await?;
        knowledge.mark_processing(&self.services.db).await?;

        let raw_bytes = match &knowledge.source {
            KnowledgeSource::File { storage_path, .. } => {
                Some(self.services.storage.get(storage_path).await?)
            }
            KnowledgeSource::Url { .. } => None,
        };

        let attempt = Self::attempt_of(task);
        let mut ctx = IngestionContext::new(
            &self.services,
            &self.config.tuning,
            task.id.clone(),
            attempt,
            kb,
            knowledge,
            raw_bytes,
        );

        if let Err(err) = self.run_stages(&mut ctx).await {
            let message = err.to_string();
            let _ = ctx.knowledge.mark_failed(&self.services.db, message).await;
            return Err(err);
        }

        Ok(())
    }

    /// Clones every `Knowledge`/`Chunk`/`IndexEntry` row of a source KB into
    /// a destination KB (§4.2), remapping ids via `CopyIdMaps` and reusing
    /// embeddings verbatim rather than re-embedding. Source and destination
    /// KBs are expected to already exist; the route handler that enqueues
    /// this task is responsible for creating the destination KB first.
    async fn drive_copy_task(&self, task: &Task) -> Result<(), AppError> {
        let source_kb_id = Self::payload_field(&task.payload, "source_kb_id")?;
        let dest_kb_id = Self::payload_field(&task.payload, "dest_kb_id")?;

        let source_kb = self.load_knowledge_base(source_kb_id).await?;
        let dest_kb = self.load_knowledge_base(dest_kb_id).await?;

        let knowledge_rows = Knowledge::list_for_kb(&self.services.db, source_kb_id).await?;
        let mut knowledge_id_map = HashMap::with_capacity(knowledge_rows.len());
        let mut chunk_id_map = HashMap::new();
        let mut copied_bytes: u64 = 0;

        for source_knowledge in &knowledge_rows {
            let mut copy = source_knowledge.clone();
            let new_id = uuid::Uuid::new_v4().to_string();
            knowledge_id_map.insert(source_knowledge.id.clone(), new_id.clone());
            copy.id = new_id;
            copy.tenant_id = dest_kb.tenant_id.clone();
            copy.kb_id = dest_kb_id.to_string();
            copied_bytes = copied_bytes.saturating_add(copy.storage_size_bytes);
            self.services.db.store_item(copy).await?;

            let chunks = Chunk::list_for_knowledge(&self.services.db, &source_knowledge.id).await?;
            let mut copied_chunks = Vec::with_capacity(chunks.len());
            for source_chunk in &chunks {
                let mut chunk_copy = source_chunk.clone();
                let new_chunk_id = uuid::Uuid::new_v4().to_string();
                chunk_id_map.insert(source_chunk.id.clone(), new_chunk_id.clone());
                chunk_copy.id = new_chunk_id;
                chunk_copy.tenant_id = dest_kb.tenant_id.clone();
                chunk_copy.kb_id = dest_kb_id.to_string();
                chunk_copy.knowledge_id = knowledge_id_map
                    .get(&source_knowledge.id)
                    .cloned()
                    .unwrap_or_default();
                copied_chunks.push(chunk_copy);
            }
            if !copied_chunks.is_empty() {
                Chunk::store_many(&self.services.db, &copied_chunks).await?;
            }
        }

        let maps = CopyIdMaps {
            chunk_id_map,
            knowledge_id_map,
            dst_kb_id: dest_kb_id.to_string(),
        };

        let Some(engine_type) = engine_type_for(source_kb.backend) else {
            return Ok(());
        };
        let engine = self
            .services
            .engines
            .get(engine_type)
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "no retrieval backend registered for engine_type '{engine_type}'"
                ))
            })?;

        let mut offset = 0u32;
        loop {
            let page =
                IndexEntry::list_for_kb_page(&self.services.db, source_kb_id, offset, COPY_BATCH_SIZE)
                    .await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            copied_bytes = copied_bytes.saturating_add(engine.estimate_storage_size(&page));
            engine.copy_indices(&page, &maps).await?;
            if page_len < COPY_BATCH_SIZE as usize {
                break;
            }
            offset = offset.saturating_add(COPY_BATCH_SIZE);
        }

        let _ = Tenant::try_commit_usage(&self.services.db, &dest_kb.tenant_id, copied_bytes).await;
        KnowledgeBase::mark_ingested(&self.services.db, dest_kb_id).await?;

        Ok(())
    }

    async fn run_stages(&self, ctx: &mut IngestionContext<'_>) -> Result<(), AppError> {
        let machine = validated();
        let machine = parse(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let machine = chunk(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let machine = enrich(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let machine = embed(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let machine = index(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        let _machine = finalize(machine, ctx).await.map_err(|err| ctx.abort(err))?;
        Ok(())
    }
}
