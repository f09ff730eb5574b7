use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Return a fixed, canned response when retrieval finds nothing.
    Fixed,
    /// Let the model respond with empty context, still prefixed by the
    /// no-match marker.
    Model,
}

/// Generation parameters handed to the summary model on `chat_completion_stream`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub seed: Option<u64>,
    pub max_tokens: u32,
    pub prompt_template: String,
    pub context_template: String,
    pub no_match_prefix: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 1.0,
            seed: None,
            max_tokens: 1024,
            prompt_template: "You are a helpful assistant answering from the supplied context."
                .to_string(),
            context_template: "Source: {title}\n{content}".to_string(),
            no_match_prefix: "I couldn't find anything relevant in the knowledge base."
                .to_string(),
        }
    }
}

/// Per-session retrieval tuning: thresholds and top-Ks the query pipeline
/// reads on every turn.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetrievalStrategy {
    pub max_rounds: u32,
    pub enable_rewrite: bool,
    pub fallback_strategy: FallbackStrategy,
    pub vector_threshold: f32,
    pub vector_top_k: u32,
    pub keyword_threshold: f32,
    pub keyword_top_k: u32,
    pub rerank_model: Option<String>,
    pub rerank_threshold: f32,
    pub rerank_top_k: u32,
}

impl Default for RetrievalStrategy {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            enable_rewrite: true,
            fallback_strategy: FallbackStrategy::Model,
            vector_threshold: 0.35,
            vector_top_k: 20,
            keyword_threshold: 0.1,
            keyword_top_k: 20,
            rerank_model: None,
            rerank_threshold: 0.0,
            rerank_top_k: 8,
        }
    }
}

stored_object!(Session, "session", {
    tenant_id: String,
    kb_id: String,
    title: Option<String>,
    summary_model: String,
    retrieval: RetrievalStrategy,
    generation: GenerationParams
});

impl Session {
    pub fn new(tenant_id: String, kb_id: String, summary_model: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            kb_id,
            title: None,
            summary_model,
            retrieval: RetrievalStrategy::default(),
            generation: GenerationParams::default(),
        }
    }

    pub async fn get_owned(
        db: &SurrealDbClient,
        id: &str,
        tenant_id: &str,
    ) -> Result<Session, AppError> {
        let session: Option<Session> = db.get_item(id).await?;
        let session = session.ok_or_else(|| AppError::NotFound(format!("session {id}")))?;
        if session.tenant_id != tenant_id {
            return Err(AppError::Forbidden(format!("session {id} belongs to another tenant")));
        }
        Ok(session)
    }

    pub async fn set_title(&mut self, db: &SurrealDbClient, title: String) -> Result<(), AppError> {
        self.title = Some(title);
        self.updated_at = Utc::now();
        db.store_item(self.clone()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_owned_rejects_cross_tenant_access() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let session = Session::new("tenant-1".into(), "kb-1".into(), "gpt-4o-mini".into());
        db.store_item(session.clone()).await.expect("store");

        let result = Session::get_owned(&db, &session.id, "tenant-2").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
