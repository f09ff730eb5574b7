use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::{
        chunk::Chunk,
        knowledge::{Knowledge, KnowledgeSource},
        message::KnowledgeReference,
    },
};
use tracing::warn;

use crate::pipeline::{
    chat_manage::ChatManage,
    stage::{Stage, StageKind},
};

fn title_for(source: &KnowledgeSource) -> String {
    match source {
        KnowledgeSource::File { file_name, .. } => file_name.clone(),
        KnowledgeSource::Url { url } => url.clone(),
    }
}

/// Enriches each reranked candidate with its document neighbors (previous
/// and next chunk content, plus a parent chunk's content when set) so the
/// model sees continuous context rather than an isolated fragment, per
/// SPEC_FULL §4.5. Candidates are already deduplicated by chunk_id coming
/// out of `chunk_search`'s fusion step.
pub struct ChunkMerge;

#[async_trait]
impl Stage for ChunkMerge {
    fn kind(&self) -> StageKind {
        StageKind::ChunkMerge
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        let mut titles: HashMap<String, String> = HashMap::new();
        let mut references = Vec::with_capacity(ctx.rerank_result.len());

        for scored in &ctx.rerank_result {
            let entry = &scored.item.entry;

            let chunk: Option<Chunk> = ctx
                .services
                .db
                .get_item(&entry.chunk_id)
                .await
                .unwrap_or_else(|err| {
                    warn!(error = %err, chunk_id = %entry.chunk_id, "chunk_merge lookup failed");
                    None
                });

            let content = match &chunk {
                Some(chunk) => merge_neighbor_content(&ctx.services.db, chunk).await,
                None => entry.content.clone(),
            };

            let title = if let Some(title) = titles.get(&entry.knowledge_id) {
                title.clone()
            } else {
                let knowledge: Option<Knowledge> =
                    ctx.services.db.get_item(&entry.knowledge_id).await.unwrap_or(None);
                let title = knowledge
                    .map(|knowledge| title_for(&knowledge.source))
                    .unwrap_or_else(|| entry.knowledge_id.clone());
                titles.insert(entry.knowledge_id.clone(), title.clone());
                title
            };

            let (start_offset, end_offset) = chunk
                .as_ref()
                .map(|chunk| (chunk.start_offset, chunk.end_offset))
                .unwrap_or((0, 0));

            references.push(KnowledgeReference {
                knowledge_id: entry.knowledge_id.clone(),
                chunk_id: entry.chunk_id.clone(),
                title,
                content,
                start_offset,
                end_offset,
            });
        }

        ctx.merge_result = references;
        Ok(())
    }
}

async fn merge_neighbor_content(db: &common::storage::db::SurrealDbClient, chunk: &Chunk) -> String {
    let mut parts = Vec::new();

    if let Some(parent_id) = &chunk.parent_chunk_id {
        if let Ok(Some(parent)) = db.get_item::<Chunk>(parent_id).await {
            parts.push(parent.content);
        }
    }
    if let Some(prev_id) = &chunk.prev_chunk_id {
        if let Ok(Some(prev)) = db.get_item::<Chunk>(prev_id).await {
            parts.push(prev.content);
        }
    }

    parts.push(chunk.content.clone());

    if let Some(next_id) = &chunk.next_chunk_id {
        if let Ok(Some(next)) = db.get_item::<Chunk>(next_id).await {
            parts.push(next.content);
        }
    }

    parts.join("\n\n")
}
