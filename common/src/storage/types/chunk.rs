use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// What produced a chunk's content.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Text,
    ImageOcr,
    ImageCaption,
    Summary,
    Entity,
    Relationship,
}

/// Metadata for an image-derived chunk (OCR/caption), kept alongside the
/// chunk it was extracted into.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ImageInfo {
    pub url: String,
    pub caption: Option<String>,
    pub ocr_text: Option<String>,
    pub start_offset: u32,
    pub end_offset: u32,
}

stored_object!(Chunk, "chunk", {
    tenant_id: String,
    kb_id: String,
    knowledge_id: String,
    content: String,
    chunk_index: u32,
    start_offset: u32,
    end_offset: u32,
    prev_chunk_id: Option<String>,
    next_chunk_id: Option<String>,
    parent_chunk_id: Option<String>,
    chunk_type: ChunkType,
    relation_chunks: Vec<String>,
    indirect_relation_chunks: Vec<String>,
    image_info: Option<ImageInfo>
});

#[derive(Debug, thiserror::Error)]
pub enum ChunkLinkageError {
    #[error("parent_chunk_id {0} would create a cycle")]
    ParentCycle(String),
}

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: String,
        kb_id: String,
        knowledge_id: String,
        content: String,
        chunk_index: u32,
        start_offset: u32,
        end_offset: u32,
        chunk_type: ChunkType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            kb_id,
            knowledge_id,
            content,
            chunk_index,
            start_offset,
            end_offset,
            prev_chunk_id: None,
            next_chunk_id: None,
            parent_chunk_id: None,
            chunk_type,
            relation_chunks: Vec::new(),
            indirect_relation_chunks: Vec::new(),
            image_info: None,
        }
    }

    /// Links a freshly ordered run of chunks by setting prev/next pointers
    /// and chunk_index in document order. Does not touch parent linkage.
    pub fn link_sequence(chunks: &mut [Chunk]) {
        for i in 0..chunks.len() {
            chunks[i].chunk_index = u32::try_from(i).unwrap_or(u32::MAX);
            chunks[i].prev_chunk_id = if i == 0 {
                None
            } else {
                Some(chunks[i - 1].id.clone())
            };
            chunks[i].next_chunk_id = chunks.get(i + 1).map(|c| c.id.clone());
        }
    }

    /// Rejects a parent assignment that would create a parent/child cycle
    /// among the given candidate set (per the ingestion acyclicity invariant).
    pub fn set_parent(
        &mut self,
        parent_id: String,
        existing: &[Chunk],
    ) -> Result<(), ChunkLinkageError> {
        let mut visited = std::collections::HashSet::new();
        let mut cursor = Some(parent_id.clone());
        while let Some(id) = cursor {
            if id == self.id || !visited.insert(id.clone()) {
                return Err(ChunkLinkageError::ParentCycle(parent_id));
            }
            cursor = existing
                .iter()
                .find(|c| c.id == id)
                .and_then(|c| c.parent_chunk_id.clone());
        }
        self.parent_chunk_id = Some(parent_id);
        Ok(())
    }

    pub async fn store_many(db: &SurrealDbClient, chunks: &[Chunk]) -> Result<(), AppError> {
        for chunk in chunks {
            db.store_item(chunk.clone()).await?;
        }
        Ok(())
    }

    pub async fn list_for_knowledge(
        db: &SurrealDbClient,
        knowledge_id: &str,
    ) -> Result<Vec<Chunk>, AppError> {
        let mut chunks: Vec<Chunk> = db
            .client
            .query("SELECT * FROM chunk WHERE knowledge_id = $knowledge_id ORDER BY chunk_index ASC;")
            .bind(("knowledge_id", knowledge_id.to_owned()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    pub async fn delete_by_knowledge_id(
        db: &SurrealDbClient,
        knowledge_id: &str,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE chunk WHERE knowledge_id = $knowledge_id;")
            .bind(("knowledge_id", knowledge_id.to_owned()))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(idx: u32) -> Chunk {
        Chunk::new(
            "tenant-1".into(),
            "kb-1".into(),
            "knowledge-1".into(),
            format!("chunk {idx}"),
            idx,
            0,
            10,
            ChunkType::Text,
        )
    }

    #[test]
    fn link_sequence_produces_ordered_doubly_linked_chain() {
        let mut chunks = vec![chunk(9), chunk(8), chunk(7)];
        Chunk::link_sequence(&mut chunks);

        assert_eq!(chunks[0].chunk_index, 0);
        assert!(chunks[0].prev_chunk_id.is_none());
        assert_eq!(chunks[0].next_chunk_id.as_deref(), Some(chunks[1].id.as_str()));
        assert_eq!(chunks[1].prev_chunk_id.as_deref(), Some(chunks[0].id.as_str()));
        assert_eq!(chunks[2].next_chunk_id, None);
    }

    #[test]
    fn set_parent_rejects_cycle() {
        let mut a = chunk(0);
        let mut b = chunk(1);
        b.parent_chunk_id = Some(a.id.clone());
        let existing = vec![a.clone(), b.clone()];

        let result = a.set_parent(b.id.clone(), &existing);
        assert!(matches!(result, Err(ChunkLinkageError::ParentCycle(_))));
    }
}
