pub mod pipeline;
pub mod reranking;
pub mod scoring;
pub mod session;
pub mod sse;

pub use pipeline::{
    chat_manage::{ChatManage, PipelineServices},
    driver::PipelineDriver,
};
pub use session::{KnowledgeQA, SearchKnowledge};
pub use sse::SseEvent;

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use common::{
        model::registry::ModelRegistry,
        retrieval::{engines::surreal::SurrealRetrievalEngine, registry::EngineRegistry},
        storage::{
            db::SurrealDbClient,
            types::{
                knowledge_base::{KnowledgeBase, RetrievalBackendKind},
                session::Session,
            },
        },
        stream::manager::StreamManager,
        utils::config::AppConfig,
    };
    use uuid::Uuid;

    use crate::{pipeline::chat_manage::PipelineServices, session::SearchKnowledge};

    async fn services() -> PipelineServices {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, &database)
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let mut engines = EngineRegistry::new();
        engines.register(Arc::new(SurrealRetrievalEngine::new(Arc::new(db.clone()))));

        let config = AppConfig::default();
        PipelineServices {
            db: Arc::new(db),
            models: Arc::new(ModelRegistry::new(&config).expect("model registry")),
            engines: Arc::new(engines),
            rerankers: None,
            streams: Arc::new(StreamManager::new(Duration::from_secs(30))),
        }
    }

    fn kb() -> KnowledgeBase {
        KnowledgeBase::new(
            "tenant-1".into(),
            "docs".into(),
            512,
            64,
            vec!["\n\n".into()],
            false,
            "local".into(),
            3,
            "gpt-4o-mini".into(),
            None,
            RetrievalBackendKind::Relational,
            None,
        )
        .expect("valid kb")
    }

    #[tokio::test]
    async fn search_knowledge_returns_empty_context_with_no_indexed_chunks() {
        let services = services().await;
        let kb = kb();
        let session = Session::new(kb.tenant_id.clone(), kb.id.clone(), kb.chat_model.clone());

        let search = SearchKnowledge::new(services, Duration::from_secs(5));
        let references = search
            .run(session, kb, "what is the meaning of life?".to_string())
            .await
            .expect("search should not error with no data indexed");

        assert!(references.is_empty());
    }
}
