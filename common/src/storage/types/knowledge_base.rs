use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Where a knowledge base's chunks get indexed for retrieval.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalBackendKind {
    /// Vector (HNSW) + keyword (BM25) search over a relational store.
    Relational,
    /// Inverted-index full-text search engine.
    InvertedIndex,
    /// Graph store over extracted entities/relationships.
    Graph,
}

stored_object!(KnowledgeBase, "knowledge_base", {
    tenant_id: String,
    name: String,
    chunk_size: u32,
    chunk_overlap: u32,
    separators: Vec<String>,
    multimodal: bool,
    embedding_model: String,
    embedding_dimension: u32,
    chat_model: String,
    rerank_model: Option<String>,
    backend: RetrievalBackendKind,
    graph_extraction_template: Option<String>,
    /// Set once the first Knowledge has been ingested; after that,
    /// `embedding_model`/`embedding_dimension` may no longer change.
    has_ingested_knowledge: bool
});

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeBaseValidationError {
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapNotSmallerThanSize { overlap: u32, size: u32 },
    #[error("separators must not be empty")]
    EmptySeparators,
    #[error("embedding model is immutable once a knowledge base has ingested content")]
    EmbeddingModelImmutable,
}

impl KnowledgeBase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: String,
        name: String,
        chunk_size: u32,
        chunk_overlap: u32,
        separators: Vec<String>,
        multimodal: bool,
        embedding_model: String,
        embedding_dimension: u32,
        chat_model: String,
        rerank_model: Option<String>,
        backend: RetrievalBackendKind,
        graph_extraction_template: Option<String>,
    ) -> Result<Self, KnowledgeBaseValidationError> {
        Self::validate_chunking(chunk_size, chunk_overlap, &separators)?;
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            name,
            chunk_size,
            chunk_overlap,
            separators,
            multimodal,
            embedding_model,
            embedding_dimension,
            chat_model,
            rerank_model,
            backend,
            graph_extraction_template,
            has_ingested_knowledge: false,
        })
    }

    fn validate_chunking(
        chunk_size: u32,
        chunk_overlap: u32,
        separators: &[String],
    ) -> Result<(), KnowledgeBaseValidationError> {
        if chunk_overlap >= chunk_size {
            return Err(KnowledgeBaseValidationError::OverlapNotSmallerThanSize {
                overlap: chunk_overlap,
                size: chunk_size,
            });
        }
        if separators.is_empty() {
            return Err(KnowledgeBaseValidationError::EmptySeparators);
        }
        Ok(())
    }

    /// Apply an update, rejecting an embedding model/dimension change once
    /// content has been ingested.
    pub fn apply_update(
        &mut self,
        name: Option<String>,
        chunk_size: Option<u32>,
        chunk_overlap: Option<u32>,
        separators: Option<Vec<String>>,
        embedding_model: Option<String>,
        embedding_dimension: Option<u32>,
        chat_model: Option<String>,
        rerank_model: Option<Option<String>>,
    ) -> Result<(), KnowledgeBaseValidationError> {
        if (embedding_model.is_some() || embedding_dimension.is_some())
            && self.has_ingested_knowledge
        {
            return Err(KnowledgeBaseValidationError::EmbeddingModelImmutable);
        }

        let next_size = chunk_size.unwrap_or(self.chunk_size);
        let next_overlap = chunk_overlap.unwrap_or(self.chunk_overlap);
        let next_separators = separators.clone().unwrap_or_else(|| self.separators.clone());
        Self::validate_chunking(next_size, next_overlap, &next_separators)?;

        if let Some(name) = name {
            self.name = name;
        }
        self.chunk_size = next_size;
        self.chunk_overlap = next_overlap;
        if let Some(separators) = separators {
            self.separators = separators;
        }
        if let Some(model) = embedding_model {
            self.embedding_model = model;
        }
        if let Some(dim) = embedding_dimension {
            self.embedding_dimension = dim;
        }
        if let Some(model) = chat_model {
            self.chat_model = model;
        }
        if let Some(rerank) = rerank_model {
            self.rerank_model = rerank;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub async fn mark_ingested(db: &SurrealDbClient, kb_id: &str) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('knowledge_base', $id) SET has_ingested_knowledge = true;",
            )
            .bind(("id", kb_id.to_owned()))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn list_for_tenant(
        db: &SurrealDbClient,
        tenant_id: &str,
    ) -> Result<Vec<KnowledgeBase>, AppError> {
        db.client
            .query("SELECT * FROM knowledge_base WHERE tenant_id = $tenant_id;")
            .bind(("tenant_id", tenant_id.to_owned()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_kb() -> Result<KnowledgeBase, KnowledgeBaseValidationError> {
        KnowledgeBase::new(
            "tenant-1".into(),
            "docs".into(),
            512,
            64,
            vec!["\n\n".into(), "。".into()],
            false,
            "text-embedding-3-small".into(),
            1536,
            "gpt-4o-mini".into(),
            None,
            RetrievalBackendKind::Relational,
            None,
        )
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let result = KnowledgeBase::new(
            "tenant-1".into(),
            "docs".into(),
            100,
            100,
            vec!["\n".into()],
            false,
            "m".into(),
            8,
            "c".into(),
            None,
            RetrievalBackendKind::Relational,
            None,
        );
        assert!(matches!(
            result,
            Err(KnowledgeBaseValidationError::OverlapNotSmallerThanSize { .. })
        ));
    }

    #[test]
    fn rejects_empty_separators() {
        let result = KnowledgeBase::new(
            "tenant-1".into(),
            "docs".into(),
            100,
            10,
            vec![],
            false,
            "m".into(),
            8,
            "c".into(),
            None,
            RetrievalBackendKind::Relational,
            None,
        );
        assert!(matches!(
            result,
            Err(KnowledgeBaseValidationError::EmptySeparators)
        ));
    }

    #[test]
    fn rejects_embedding_model_change_after_ingestion() {
        let mut kb = default_kb().expect("valid kb");
        kb.has_ingested_knowledge = true;
        let result = kb.apply_update(None, None, None, None, Some("other-model".into()), None, None, None);
        assert!(matches!(
            result,
            Err(KnowledgeBaseValidationError::EmbeddingModelImmutable)
        ));
    }

    #[test]
    fn allows_non_embedding_update_after_ingestion() {
        let mut kb = default_kb().expect("valid kb");
        kb.has_ingested_knowledge = true;
        kb.apply_update(Some("renamed".into()), None, None, None, None, None, None, None)
            .expect("non-embedding update should succeed");
        assert_eq!(kb.name, "renamed");
    }
}
