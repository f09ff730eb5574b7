use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(GraphEntity, "graph_entity", {
    tenant_id: String,
    kb_id: String,
    knowledge_id: String,
    name: String,
    entity_type: String,
    description: String,
    attributes: Option<serde_json::Value>,
    chunk_ids: Vec<String>
});

impl GraphEntity {
    pub fn new(
        tenant_id: String,
        kb_id: String,
        knowledge_id: String,
        name: String,
        entity_type: String,
        description: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            kb_id,
            knowledge_id,
            name,
            entity_type,
            description,
            attributes: None,
            chunk_ids: Vec::new(),
        }
    }

    /// Looks up entities by name within a (tenant, kb, knowledge) namespace,
    /// used to seed one-hop graph expansion from mentions found in a query.
    pub async fn find_by_names(
        db: &SurrealDbClient,
        kb_id: &str,
        names: &[String],
    ) -> Result<Vec<GraphEntity>, AppError> {
        db.client
            .query("SELECT * FROM graph_entity WHERE kb_id = $kb_id AND name IN $names;")
            .bind(("kb_id", kb_id.to_owned()))
            .bind(("names", names.to_vec()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)
    }

    pub async fn delete_by_knowledge_id(
        db: &SurrealDbClient,
        knowledge_id: &str,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE graph_entity WHERE knowledge_id = $knowledge_id;")
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

    #[tokio::test]
    async fn find_by_names_is_scoped_to_kb() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let entity = GraphEntity::new(
            "tenant-1".into(),
            "kb-1".into(),
            "knowledge-1".into(),
            "Ada Lovelace".into(),
            "person".into(),
            "mathematician".into(),
        );
        db.store_item(entity.clone()).await.expect("store");

        let found = GraphEntity::find_by_names(&db, "kb-1", &["Ada Lovelace".to_string()])
            .await
            .expect("query");
        assert_eq!(found.len(), 1);

        let not_found = GraphEntity::find_by_names(&db, "kb-2", &["Ada Lovelace".to_string()])
            .await
            .expect("query");
        assert!(not_found.is_empty());
    }
}
