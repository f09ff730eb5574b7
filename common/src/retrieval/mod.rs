pub mod engines;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::types::index_entry::IndexEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverType {
    Keywords,
    Vector,
}

#[derive(Debug, Clone)]
pub struct RetrieveParams {
    pub query_text: String,
    pub embedding: Option<Vec<f32>>,
    pub kb_ids: Vec<String>,
    pub exclude_knowledge_ids: Vec<String>,
    pub exclude_chunk_ids: Vec<String>,
    pub top_k: u32,
    pub threshold: f32,
    pub retriever_type: RetrieverType,
}

#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub entry: IndexEntry,
    pub score: f32,
}

/// What happens when a `batch_save` collides with an existing `chunk_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Skip,
    Replace,
}

/// Remaps applied while copying indices from one KB to another; vectors are
/// reused verbatim, only the owning ids change.
#[derive(Debug, Clone)]
pub struct CopyIdMaps {
    pub chunk_id_map: std::collections::HashMap<String, String>,
    pub knowledge_id_map: std::collections::HashMap<String, String>,
    pub dst_kb_id: String,
}

/// Capability contract every retrieval backend satisfies (§4.2). The query
/// pipeline and the ingestion indexer both go through an `EngineRegistry`
/// rather than constructing engines themselves.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    fn engine_type(&self) -> &'static str;
    fn supports(&self, retriever_type: RetrieverType) -> bool;

    async fn save(&self, entry: &IndexEntry) -> Result<(), AppError>;
    async fn batch_save(&self, entries: &[IndexEntry], on_conflict: OnConflict) -> Result<(), AppError>;
    async fn delete_by_chunk_ids(&self, chunk_ids: &[String]) -> Result<(), AppError>;
    async fn delete_by_knowledge_ids(&self, knowledge_ids: &[String]) -> Result<(), AppError>;
    async fn retrieve(&self, params: &RetrieveParams) -> Result<Vec<RetrievalHit>, AppError>;

    /// Estimated bytes this backend would add for `entries` before commit.
    fn estimate_storage_size(&self, entries: &[IndexEntry]) -> u64 {
        entries
            .iter()
            .map(|e| IndexEntry::estimate_storage_bytes(e.content.len(), e.dimension))
            .sum()
    }

    async fn copy_indices(&self, source_entries: &[IndexEntry], maps: &CopyIdMaps) -> Result<(), AppError> {
        let remapped: Vec<IndexEntry> = source_entries
            .iter()
            .cloned()
            .map(|mut e| {
                e.id = uuid::Uuid::new_v4().to_string();
                e.kb_id = maps.dst_kb_id.clone();
                if let Some(mapped) = maps.chunk_id_map.get(&e.chunk_id) {
                    e.chunk_id = mapped.clone();
                }
                if let Some(mapped) = maps.knowledge_id_map.get(&e.knowledge_id) {
                    e.knowledge_id = mapped.clone();
                }
                e
            })
            .collect();
        self.batch_save(&remapped, OnConflict::Skip).await
    }
}

/// A single-hop graph expansion result: entities reached plus the edges
/// traversed to reach them.
#[derive(Debug, Clone, Default)]
pub struct GraphExpansion {
    pub node_ids: Vec<String>,
    pub relation_ids: Vec<String>,
}

/// The graph store does not participate in keyword/vector retrieval; it is
/// its own capability, scoped by a `(tenant_id, kb_id, knowledge_id)`
/// namespace.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn add_graph(
        &self,
        tenant_id: &str,
        kb_id: &str,
        knowledge_id: &str,
        entities: &[crate::storage::types::graph_entity::GraphEntity],
    ) -> Result<(), AppError>;

    async fn del_graph(&self, knowledge_ids: &[String]) -> Result<(), AppError>;

    async fn search_node(
        &self,
        kb_id: &str,
        seed_names: &[String],
    ) -> Result<GraphExpansion, AppError>;
}
