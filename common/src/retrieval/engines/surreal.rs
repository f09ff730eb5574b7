use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppError,
    retrieval::{OnConflict, RetrievalBackend, RetrieveParams, RetrieverType},
    storage::{db::SurrealDbClient, types::index_entry::IndexEntry},
};

/// Vector (HNSW) + keyword (BM25) retrieval over the relational SurrealDB
/// store, grounded on the source crate's `text_chunk`/`text_chunk_embedding`
/// query patterns but generalized to the `index_entry` table.
pub struct SurrealRetrievalEngine {
    db: Arc<SurrealDbClient>,
}

impl SurrealRetrievalEngine {
    #[must_use]
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    async fn retrieve_vector(
        &self,
        params: &RetrieveParams,
    ) -> Result<Vec<crate::retrieval::RetrievalHit>, AppError> {
        let embedding = params
            .embedding
            .as_ref()
            .ok_or_else(|| AppError::Validation("vector retrieval requires an embedding".into()))?;

        let hits = IndexEntry::vector_search(
            &self.db,
            &params.kb_ids,
            embedding,
            params.top_k,
            params.threshold,
        )
        .await?;

        Ok(hits
            .into_iter()
            .filter(|(entry, _)| {
                !params.exclude_chunk_ids.contains(&entry.chunk_id)
                    && !params.exclude_knowledge_ids.contains(&entry.knowledge_id)
            })
            .map(|(entry, score)| crate::retrieval::RetrievalHit { entry, score })
            .collect())
    }

    async fn retrieve_keywords(
        &self,
        params: &RetrieveParams,
    ) -> Result<Vec<crate::retrieval::RetrievalHit>, AppError> {
        #[derive(serde::Deserialize)]
        struct Row {
            #[serde(flatten)]
            entry: IndexEntry,
            score: f32,
        }

        let mut response = self
            .db
            .client
            .query(
                "SELECT *, search::score(1) AS score FROM index_entry \
                 WHERE kb_id IN $kb_ids AND content @1@ $query_text \
                 ORDER BY score DESC LIMIT $top_k;",
            )
            .bind(("kb_ids", params.kb_ids.clone()))
            .bind(("query_text", params.query_text.clone()))
            .bind(("top_k", params.top_k))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;
        Ok(rows
            .into_iter()
            .filter(|row| {
                !params.exclude_chunk_ids.contains(&row.entry.chunk_id)
                    && !params.exclude_knowledge_ids.contains(&row.entry.knowledge_id)
            })
            .map(|row| crate::retrieval::RetrievalHit {
                entry: row.entry,
                score: row.score,
            })
            .collect())
    }
}

#[async_trait]
impl RetrievalBackend for SurrealRetrievalEngine {
    fn engine_type(&self) -> &'static str {
        "surreal_relational"
    }

    fn supports(&self, _retriever_type: RetrieverType) -> bool {
        true
    }

    async fn save(&self, entry: &IndexEntry) -> Result<(), AppError> {
        self.db.store_item(entry.clone()).await
    }

    async fn batch_save(&self, entries: &[IndexEntry], _on_conflict: OnConflict) -> Result<(), AppError> {
        IndexEntry::batch_save(&self.db, entries).await
    }

    async fn delete_by_chunk_ids(&self, chunk_ids: &[String]) -> Result<(), AppError> {
        IndexEntry::delete_by_chunk_ids(&self.db, chunk_ids).await
    }

    async fn delete_by_knowledge_ids(&self, knowledge_ids: &[String]) -> Result<(), AppError> {
        IndexEntry::delete_by_knowledge_ids(&self.db, knowledge_ids).await
    }

    async fn retrieve(&self, params: &RetrieveParams) -> Result<Vec<crate::retrieval::RetrievalHit>, AppError> {
        match params.retriever_type {
            RetrieverType::Vector => self.retrieve_vector(params).await,
            RetrieverType::Keywords => self.retrieve_keywords(params).await,
        }
    }
}
