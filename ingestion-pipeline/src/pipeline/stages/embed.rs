use futures::{stream, StreamExt};
use tracing::debug;

use common::{
    error::AppError,
    storage::types::index_entry::{IndexEntry, SourceType},
};

use crate::pipeline::{
    context::IngestionContext,
    state::{Embedded, Enriched, IngestionMachine},
};

use super::map_guard_error;

/// SPEC_FULL §4.4 step 8: embed every chunk's content via the KB's
/// configured embedding model, bounded by `embedding_concurrency` in-flight
/// calls, and turn each result into an `IndexEntry` ready for the indexing
/// stage.
#[tracing::instrument(skip_all, fields(task_id = %ctx.task_id, knowledge_id = %ctx.knowledge.id))]
pub async fn embed(
    machine: IngestionMachine<(), Enriched>,
    ctx: &mut IngestionContext<'_>,
) -> Result<IngestionMachine<(), Embedded>, AppError> {
    let embed_model = ctx
        .services
        .models
        .embed_model(&ctx.kb.embedding_model, ctx.kb.embedding_dimension)
        .ok_or_else(|| {
            AppError::InternalError(format!(
                "embedding model '{}' is not available",
                ctx.kb.embedding_model
            ))
        })?;

    let concurrency = ctx.tuning.embedding_concurrency.max(1);
    let tenant_id = &ctx.knowledge.tenant_id;
    let kb_id = &ctx.kb.id;
    let knowledge_id = &ctx.knowledge.id;

    let entries: Vec<IndexEntry> = stream::iter(ctx.chunks.iter())
        .map(|chunk| {
            let embed_model = &embed_model;
            async move {
                let embedding = embed_model.embed(&chunk.content).await?;
                Ok::<_, AppError>(IndexEntry::new(
                    tenant_id.clone(),
                    kb_id.clone(),
                    knowledge_id.clone(),
                    chunk.id.clone(),
                    SourceType::Chunk,
                    chunk.content.clone(),
                    embedding,
                ))
            }
        })
        .buffer_unordered(concurrency)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        task_id = %ctx.task_id,
        entry_count = entries.len(),
        "ingestion embed stage completed"
    );

    ctx.index_entries = entries;

    machine.embed().map_err(|(_, guard)| map_guard_error("embed", &guard))
}
