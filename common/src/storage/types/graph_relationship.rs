use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::FlexibleIdString},
};

/// A graph edge between two `GraphEntity` rows. Modeled as a manual struct
/// rather than via `stored_object!` because it is a SurrealDB `RELATE` edge
/// (`in`/`out` record links), not a plain table row.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RelationshipMetadata {
    pub tenant_id: String,
    pub kb_id: String,
    pub knowledge_id: String,
    pub relationship_type: String,
    pub description: String,
    pub weight: f32,
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GraphRelationship {
    #[serde(deserialize_with = "FlexibleIdString::deserialize_id")]
    pub id: String,
    #[serde(rename = "in", deserialize_with = "FlexibleIdString::deserialize_id")]
    pub in_: String,
    #[serde(deserialize_with = "FlexibleIdString::deserialize_id")]
    pub out: String,
    pub metadata: RelationshipMetadata,
}

impl GraphRelationship {
    /// Creates (or replaces, by deterministic id) the edge between two
    /// entities, mirroring the source crate's delete-then-recreate pattern
    /// for idempotent relation upserts.
    pub async fn store(
        db: &SurrealDbClient,
        source_entity_id: &str,
        target_entity_id: &str,
        metadata: RelationshipMetadata,
    ) -> Result<(), AppError> {
        let edge_id = format!("{source_entity_id}_{target_entity_id}_{}", metadata.relationship_type);

        db.client
            .query(
                "DELETE type::thing('relates_to', $edge_id); \
                 RELATE (type::thing('graph_entity', $source))->relates_to->(type::thing('graph_entity', $target)) \
                 SET id = type::thing('relates_to', $edge_id), metadata = $metadata;",
            )
            .bind(("edge_id", edge_id))
            .bind(("source", source_entity_id.to_owned()))
            .bind(("target", target_entity_id.to_owned()))
            .bind(("metadata", metadata))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn delete_by_knowledge_id(
        db: &SurrealDbClient,
        knowledge_id: &str,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE relates_to WHERE metadata.knowledge_id = $knowledge_id;")
            .bind(("knowledge_id", knowledge_id.to_owned()))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// One-hop expansion from a set of seed entity ids within a kb/knowledge
    /// namespace, used by `SearchNode`.
    pub async fn neighbors(
        db: &SurrealDbClient,
        kb_id: &str,
        seed_entity_ids: &[String],
    ) -> Result<Vec<GraphRelationship>, AppError> {
        db.client
            .query(
                "SELECT * FROM relates_to WHERE metadata.kb_id = $kb_id \
                 AND (array::any($seeds, |$s| in = type::thing('graph_entity', $s)) \
                      OR array::any($seeds, |$s| out = type::thing('graph_entity', $s)));",
            )
            .bind(("kb_id", kb_id.to_owned()))
            .bind(("seeds", seed_entity_ids.to_vec()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)
    }
}
