use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;

use crate::{
    error::AppError,
    retrieval::GraphExpansion,
    storage::{
        db::SurrealDbClient,
        types::{
            graph_entity::GraphEntity,
            graph_relationship::{GraphRelationship, RelationshipMetadata},
        },
    },
};

/// Graph store over extracted entities/relationships, backed by SurrealDB
/// `RELATE` edges. Namespaced by `(tenant_id, kb_id, knowledge_id)` so
/// tenants/KBs never see each other's nodes, grounded on the source crate's
/// `find_entities_by_relationship_by_id` one-hop traversal.
pub struct SurrealGraphEngine {
    db: Arc<SurrealDbClient>,
}

impl SurrealGraphEngine {
    #[must_use]
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl crate::retrieval::GraphBackend for SurrealGraphEngine {
    async fn add_graph(
        &self,
        _tenant_id: &str,
        _kb_id: &str,
        _knowledge_id: &str,
        entities: &[GraphEntity],
    ) -> Result<(), AppError> {
        for entity in entities {
            self.db.store_item(entity.clone()).await?;
        }
        Ok(())
    }

    async fn del_graph(&self, knowledge_ids: &[String]) -> Result<(), AppError> {
        for knowledge_id in knowledge_ids {
            GraphRelationship::delete_by_knowledge_id(&self.db, knowledge_id).await?;
            GraphEntity::delete_by_knowledge_id(&self.db, knowledge_id).await?;
        }
        Ok(())
    }

    async fn search_node(
        &self,
        kb_id: &str,
        seed_names: &[String],
    ) -> Result<GraphExpansion, AppError> {
        let seeds = GraphEntity::find_by_names(&self.db, kb_id, seed_names).await?;
        let seed_ids: Vec<String> = seeds.iter().map(|e| e.id.clone()).collect();
        if seed_ids.is_empty() {
            return Ok(GraphExpansion::default());
        }

        let relationships = GraphRelationship::neighbors(&self.db, kb_id, &seed_ids).await?;

        let mut node_ids: HashSet<String> = seed_ids.into_iter().collect();
        let mut relation_ids = Vec::with_capacity(relationships.len());
        for rel in &relationships {
            node_ids.insert(rel.in_.clone());
            node_ids.insert(rel.out.clone());
            relation_ids.push(rel.id.clone());
        }

        Ok(GraphExpansion {
            node_ids: node_ids.into_iter().collect(),
            relation_ids,
        })
    }
}

/// Helper used by the ingestion graph-extraction stage to build relationship
/// rows once entities have been persisted and assigned ids.
pub async fn store_relationships(
    db: &SurrealDbClient,
    tenant_id: &str,
    kb_id: &str,
    knowledge_id: &str,
    relationships: &[(String, String, String, String, f32, Vec<String>)],
) -> Result<(), AppError> {
    for (source_id, target_id, relationship_type, description, weight, chunk_ids) in relationships {
        GraphRelationship::store(
            db,
            source_id,
            target_id,
            RelationshipMetadata {
                tenant_id: tenant_id.to_string(),
                kb_id: kb_id.to_string(),
                knowledge_id: knowledge_id.to_string(),
                relationship_type: relationship_type.clone(),
                description: description.clone(),
                weight: *weight,
                chunk_ids: chunk_ids.clone(),
            },
        )
        .await?;
    }
    Ok(())
}
