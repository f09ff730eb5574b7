use tracing::debug;

use common::{
    error::AppError,
    retrieval::OnConflict,
    storage::types::{chunk::Chunk, knowledge_base::{KnowledgeBase, RetrievalBackendKind}},
};

use crate::pipeline::{
    context::IngestionContext,
    state::{Embedded, IngestionMachine, Indexed},
};

use super::map_guard_error;

/// Which registered `RetrievalBackend` a KB's chunks get indexed into. A
/// `Graph`-backed KB has no vector/keyword engine at all — retrieval for it
/// goes entirely through the entity graph populated in the enrich stage.
fn engine_type_for(backend: RetrievalBackendKind) -> Option<&'static str> {
    match backend {
        RetrievalBackendKind::Relational => Some("surreal_relational"),
        RetrievalBackendKind::InvertedIndex => Some("tantivy_inverted_index"),
        RetrievalBackendKind::Graph => None,
    }
}

/// SPEC_FULL §4.4 step 9: persist the chunk rows, then hand the embedded
/// entries to the KB's configured retrieval backend with upsert-on-conflict
/// semantics (re-ingesting the same chunk_id replaces its entry).
#[tracing::instrument(skip_all, fields(task_id = %ctx.task_id, knowledge_id = %ctx.knowledge.id))]
pub async fn index(
    machine: IngestionMachine<(), Embedded>,
    ctx: &mut IngestionContext<'_>,
) -> Result<IngestionMachine<(), Indexed>, AppError> {
    Chunk::store_many(&ctx.services.db, &ctx.chunks).await?;

    if let Some(engine_type) = engine_type_for(ctx.kb.backend) {
        let engine = ctx.services.engines.get(engine_type).ok_or_else(|| {
            AppError::InternalError(format!(
                "no retrieval backend registered for engine_type '{engine_type}'"
            ))
        })?;
        engine
            .batch_save(&ctx.index_entries, OnConflict::Replace)
            .await?;
    }

    if !ctx.kb.has_ingested_knowledge {
        KnowledgeBase::mark_ingested(&ctx.services.db, &ctx.kb.id).await?;
        ctx.kb.has_ingested_knowledge = true;
    }

    debug!(
        task_id = %ctx.task_id,
        chunk_count = ctx.chunks.len(),
        entry_count = ctx.index_entries.len(),
        "ingestion index stage completed"
    );

    machine.index().map_err(|(_, guard)| map_guard_error("index", &guard))
}
