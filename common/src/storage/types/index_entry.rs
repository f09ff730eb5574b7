use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// What kind of source produced the indexed content; mirrors `ChunkType`
/// loosely but is tracked independently since an engine may index entries
/// that never became first-class chunks (e.g. a future summary variant).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Chunk,
    Entity,
}

stored_object!(IndexEntry, "index_entry", {
    tenant_id: String,
    kb_id: String,
    knowledge_id: String,
    chunk_id: String,
    source_type: SourceType,
    content: String,
    embedding: Vec<f32>,
    dimension: u32
});

impl IndexEntry {
    pub fn new(
        tenant_id: String,
        kb_id: String,
        knowledge_id: String,
        chunk_id: String,
        source_type: SourceType,
        content: String,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        let dimension = u32::try_from(embedding.len()).unwrap_or(u32::MAX);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            kb_id,
            knowledge_id,
            chunk_id,
            source_type,
            content,
            embedding,
            dimension,
        }
    }

    /// Overrides the auto-computed dimension; used when reconstructing an
    /// entry from a backend's stored row where the embedding itself wasn't
    /// re-read (e.g. a keyword-only hit).
    #[must_use]
    pub fn with_dimension(mut self, dimension: u32) -> Self {
        self.dimension = dimension;
        self
    }

    /// Approximate on-disk footprint before commit: content bytes plus the
    /// embedding stored at half precision, a small row-overhead constant,
    /// and the HNSW graph's per-entry adjacency (roughly one extra
    /// half-precision copy of the vector).
    #[must_use]
    pub fn estimate_storage_bytes(content_len: usize, dimension: u32) -> u64 {
        let dim = u64::from(dimension);
        content_len as u64 + dim * 2 + 200 + 2 * dim * 2
    }

    /// Rebuilds the shared HNSW index at a new dimension. Since SurrealDB
    /// defines one HNSW index per table, this affects every knowledge base
    /// indexed into `index_entry`, not just the caller's — see
    /// `AppConfig::embedding_dimension` for the single-global-dimension
    /// simplification this implies.
    pub async fn redefine_hnsw_index(db: &SurrealDbClient, dimension: u32) -> Result<(), AppError> {
        db.client
            .query(
                "REMOVE INDEX IF EXISTS idx_embedding_index_entry_embedding ON index_entry; \
                 DEFINE INDEX idx_embedding_index_entry_embedding ON index_entry \
                 FIELDS embedding HNSW DIMENSION $dimension DIST COSINE TYPE F32 EFC 100 M 8;",
            )
            .bind(("dimension", dimension))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// Batch save with upsert-on-conflict (re-ingestion of the same chunk_id
    /// replaces rather than duplicates its entry).
    pub async fn batch_save(db: &SurrealDbClient, entries: &[IndexEntry]) -> Result<(), AppError> {
        for entry in entries {
            db.client
                .query(
                    "DELETE index_entry WHERE chunk_id = $chunk_id; \
                     CREATE index_entry CONTENT $entry;",
                )
                .bind(("chunk_id", entry.chunk_id.clone()))
                .bind(("entry", entry.clone()))
                .await
                .map_err(AppError::Database)?
                .check()
                .map_err(AppError::Database)?;
        }
        Ok(())
    }

    pub async fn delete_by_chunk_ids(
        db: &SurrealDbClient,
        chunk_ids: &[String],
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE index_entry WHERE chunk_id IN $chunk_ids;")
            .bind(("chunk_ids", chunk_ids.to_vec()))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn delete_by_knowledge_ids(
        db: &SurrealDbClient,
        knowledge_ids: &[String],
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE index_entry WHERE knowledge_id IN $knowledge_ids;")
            .bind(("knowledge_ids", knowledge_ids.to_vec()))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// Pages through every entry indexed for a KB, ordered by `id` for a
    /// stable cursor across calls. Used by the KB-to-KB copy task, which
    /// walks a source KB's entries in fixed-size batches rather than
    /// loading them all at once.
    pub async fn list_for_kb_page(
        db: &SurrealDbClient,
        kb_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<IndexEntry>, AppError> {
        db.client
            .query("SELECT * FROM index_entry WHERE kb_id = $kb_id ORDER BY id START $offset LIMIT $limit;")
            .bind(("kb_id", kb_id.to_owned()))
            .bind(("offset", offset))
            .bind(("limit", limit))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)
    }

    /// Vector search within the given KBs, filtered by the cosine threshold
    /// and ordered by ascending distance (descending similarity).
    pub async fn vector_search(
        db: &SurrealDbClient,
        kb_ids: &[String],
        embedding: &[f32],
        top_k: u32,
        threshold: f32,
    ) -> Result<Vec<(IndexEntry, f32)>, AppError> {
        #[derive(serde::Deserialize)]
        struct Row {
            #[serde(flatten)]
            entry: IndexEntry,
            distance: f32,
        }

        let mut response = db
            .client
            .query(
                "SELECT *, vector::distance::knn() AS distance FROM index_entry \
                 WHERE kb_id IN $kb_ids AND embedding <|$top_k,100|> $embedding \
                 AND (1.0 - vector::distance::knn()) >= $threshold \
                 ORDER BY distance ASC;",
            )
            .bind(("kb_ids", kb_ids.to_vec()))
            .bind(("embedding", embedding.to_vec()))
            .bind(("top_k", top_k))
            .bind(("threshold", threshold))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.entry, 1.0 - row.distance))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_storage_bytes_scales_with_dimension() {
        let small = IndexEntry::estimate_storage_bytes(100, 8);
        let large = IndexEntry::estimate_storage_bytes(100, 1536);
        assert!(large > small);
    }

    #[tokio::test]
    async fn store_and_delete_by_chunk_ids_roundtrip() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let entry = IndexEntry::new(
            "tenant-1".into(),
            "kb-1".into(),
            "knowledge-1".into(),
            "chunk-1".into(),
            SourceType::Chunk,
            "hello".into(),
            vec![0.1, 0.2, 0.3],
        );
        IndexEntry::batch_save(&db, std::slice::from_ref(&entry))
            .await
            .expect("batch save");

        IndexEntry::delete_by_chunk_ids(&db, &["chunk-1".to_string()])
            .await
            .expect("delete");

        let remaining: Vec<IndexEntry> = db
            .client
            .query("SELECT * FROM index_entry WHERE chunk_id = 'chunk-1';")
            .await
            .expect("query")
            .take(0)
            .expect("take");
        assert!(remaining.is_empty());
    }
}
