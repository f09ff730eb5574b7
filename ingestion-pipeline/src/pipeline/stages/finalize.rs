use tracing::info;

use common::{
    error::AppError,
    storage::types::{knowledge::KnowledgeSource, tenant::Tenant},
};

use crate::pipeline::{
    context::IngestionContext,
    state::{Finalized, IngestionMachine, Indexed},
};

use super::map_guard_error;

/// SPEC_FULL §4.4 steps 10-11: commit the tenant's storage usage for the
/// bytes this ingestion actually added, then mark the Knowledge row
/// completed. Quota was already pre-checked before the task was enqueued;
/// a commit rejection here means a concurrent ingestion won the race, so
/// it surfaces as a hard failure rather than silently skipping the charge.
#[tracing::instrument(skip_all, fields(task_id = %ctx.task_id, knowledge_id = %ctx.knowledge.id))]
pub async fn finalize(
    machine: IngestionMachine<(), Indexed>,
    ctx: &mut IngestionContext<'_>,
) -> Result<IngestionMachine<(), Finalized>, AppError> {
    let file_bytes = match &ctx.knowledge.source {
        KnowledgeSource::File { file_size, .. } => *file_size,
        KnowledgeSource::Url { .. } => 0,
    };
    let index_bytes: u64 = ctx
        .index_entries
        .iter()
        .map(|entry| {
            common::storage::types::index_entry::IndexEntry::estimate_storage_bytes(
                entry.content.len(),
                entry.dimension,
            )
        })
        .sum();
    let delta = file_bytes.saturating_add(index_bytes);

    let committed = Tenant::try_commit_usage(&ctx.services.db, &ctx.knowledge.tenant_id, delta).await?;
    if !committed {
        return Err(AppError::QuotaExceeded(format!(
            "tenant {} storage quota exceeded while finalizing knowledge {}",
            ctx.knowledge.tenant_id, ctx.knowledge.id
        )));
    }

    ctx.knowledge.storage_size_bytes = delta;
    ctx.knowledge.mark_completed(&ctx.services.db).await?;

    info!(
        task_id = %ctx.task_id,
        knowledge_id = %ctx.knowledge.id,
        storage_bytes = delta,
        "ingestion finalize stage completed"
    );

    machine.finalize().map_err(|(_, guard)| map_guard_error("finalize", &guard))
}
