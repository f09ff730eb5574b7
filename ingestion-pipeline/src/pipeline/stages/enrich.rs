use std::collections::{HashMap, HashSet};

use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use common::error::AppError;

use crate::{
    graph_extract::{extract_graph, link_entities_to_chunks, RelationshipDraft},
    pipeline::{
        context::IngestionContext,
        state::{Chunked, Enriched, IngestionMachine},
    },
};

use super::map_guard_error;

/// Recomputes `relation_chunks`/`indirect_relation_chunks` on every chunk
/// from the extracted entities/relationships (SPEC_FULL §4.4 step 7):
/// `relation_chunks` are chunks co-occurring in a stored relationship,
/// `indirect_relation_chunks` are chunks that merely share a mentioned
/// entity without an explicit relationship between them.
fn link_chunk_relations(
    ctx: &mut IngestionContext<'_>,
    entities: &[common::storage::types::graph_entity::GraphEntity],
    relationships: &[RelationshipDraft],
) {
    let mut relation_chunks: HashMap<String, HashSet<String>> = HashMap::new();
    for rel in relationships {
        for chunk_id in &rel.chunk_ids {
            let others = relation_chunks.entry(chunk_id.clone()).or_default();
            others.extend(rel.chunk_ids.iter().filter(|id| *id != chunk_id).cloned());
        }
    }

    let mut indirect_chunks: HashMap<String, HashSet<String>> = HashMap::new();
    for entity in entities {
        for chunk_id in &entity.chunk_ids {
            let others = indirect_chunks.entry(chunk_id.clone()).or_default();
            others.extend(entity.chunk_ids.iter().filter(|id| *id != chunk_id).cloned());
        }
    }

    for chunk in ctx.chunks.iter_mut() {
        let direct = relation_chunks.remove(&chunk.id).unwrap_or_default();
        let mut indirect = indirect_chunks.remove(&chunk.id).unwrap_or_default();
        for id in &direct {
            indirect.remove(id);
        }
        indirect.remove(&chunk.id);

        chunk.relation_chunks = direct.into_iter().collect();
        chunk.indirect_relation_chunks = indirect.into_iter().collect();
    }
}

async fn store_graph_with_retry(
    ctx: &IngestionContext<'_>,
    entities: &[common::storage::types::graph_entity::GraphEntity],
    relationships: &[RelationshipDraft],
) -> Result<(), AppError> {
    let Some(graph) = ctx.services.engines.graph() else {
        return Err(AppError::InternalError(
            "no graph backend registered but a graph extraction template is configured".into(),
        ));
    };

    let tuning = ctx.tuning;
    let mut backoff_ms = tuning.graph_initial_backoff_ms;
    let last_attempt = tuning.graph_store_attempts.saturating_sub(1);
    let tuples: Vec<_> = relationships
        .iter()
        .cloned()
        .map(RelationshipDraft::into_tuple)
        .collect();

    for attempt in 0..tuning.graph_store_attempts.max(1) {
        let result = async {
            graph
                .add_graph(
                    &ctx.knowledge.tenant_id,
                    &ctx.kb.id,
                    &ctx.knowledge.id,
                    entities,
                )
                .await?;
            common::retrieval::engines::graph::store_relationships(
                &ctx.services.db,
                &ctx.knowledge.tenant_id,
                &ctx.kb.id,
                &ctx.knowledge.id,
                &tuples,
            )
            .await
        }
        .await;

        match result {
            Ok(()) => return Ok(()),
            Err(err) if matches!(err, AppError::Database(_)) && attempt < last_attempt => {
                warn!(
                    task_id = %ctx.task_id,
                    attempt,
                    error = %err,
                    "transient error storing graph data; retrying"
                );
                sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = backoff_ms.saturating_mul(2).min(tuning.graph_max_backoff_ms);
            }
            Err(err) => return Err(err),
        }
    }

    Err(AppError::InternalError(
        "failed to store graph entities after retries".into(),
    ))
}

/// SPEC_FULL §4.4 step 7: when the KB has a graph extraction template
/// configured, run entity/relationship extraction, write it into the graph
/// store namespaced to (tenant, kb, knowledge), and stamp the linkage back
/// onto the in-memory chunks. A KB without a template skips extraction
/// entirely — graph enrichment is opt-in per knowledge base.
#[tracing::instrument(skip_all, fields(task_id = %ctx.task_id, knowledge_id = %ctx.knowledge.id))]
pub async fn enrich(
    machine: IngestionMachine<(), Chunked>,
    ctx: &mut IngestionContext<'_>,
) -> Result<IngestionMachine<(), Enriched>, AppError> {
    if let Some(template) = ctx.kb.graph_extraction_template.clone() {
        let chat_model = ctx.services.models.chat_model(&ctx.kb.chat_model).await;
        let text = ctx.text()?.to_string();

        let extraction = extract_graph(
            &chat_model,
            Some(&template),
            &ctx.knowledge.tenant_id,
            &ctx.kb.id,
            &ctx.knowledge.id,
            &text,
        )
        .await?;

        let mut entities = extraction.entities;
        let mut relationships = extraction.relationships;

        let chunk_ids_by_content: Vec<(String, String)> = ctx
            .chunks
            .iter()
            .map(|c| (c.id.clone(), c.content.clone()))
            .collect();
        link_entities_to_chunks(&mut entities, &mut relationships, &chunk_ids_by_content);

        if !entities.is_empty() {
            store_graph_with_retry(ctx, &entities, &relationships).await?;
        }

        link_chunk_relations(ctx, &entities, &relationships);

        debug!(
            task_id = %ctx.task_id,
            entity_count = entities.len(),
            relationship_count = relationships.len(),
            "ingestion enrich stage completed"
        );

        ctx.graph_entities = entities;
        ctx.relationships = relationships;
    } else {
        debug!(task_id = %ctx.task_id, "no graph extraction template configured; skipping enrichment");
    }

    machine.enrich().map_err(|(_, guard)| map_guard_error("enrich", &guard))
}
