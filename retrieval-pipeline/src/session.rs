use std::time::Duration;

use common::{
    error::AppError,
    model::chat::{ChatOptions, ChatTurn},
    storage::types::{
        knowledge_base::KnowledgeBase,
        message::{KnowledgeReference, Message},
        session::Session,
    },
};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    pipeline::{
        chat_manage::{ChatManage, PipelineServices},
        config,
        driver::PipelineDriver,
    },
    sse::SseEvent,
};

const TITLE_SYSTEM_PROMPT: &str =
    "Summarize the user's question into a short session title of five words or fewer. \
Reply with only the title, no punctuation at the end.";

/// Runs the event executor for one turn of a chat session: persists the
/// user/assistant messages, registers a reattachable stream, and fans
/// `rag_stream` deltas both into the caller's SSE channel and the stream
/// manager (SPEC_FULL §4.6).
pub struct KnowledgeQA {
    services: PipelineServices,
    driver: PipelineDriver,
}

impl KnowledgeQA {
    #[must_use]
    pub fn new(services: PipelineServices, stage_timeout: Duration) -> Self {
        Self {
            driver: PipelineDriver::new(stage_timeout),
            services,
        }
    }

    /// Generates a short title for a brand-new session from its first turn.
    /// Failure is non-fatal, the session just keeps no title.
    pub async fn maybe_title_session(&self, session: &mut Session, first_query: &str) {
        if session.title.is_some() {
            return;
        }
        let model = self.services.models.chat_model(&session.summary_model).await;
        let turn = ChatTurn {
            system: Some(TITLE_SYSTEM_PROMPT.to_string()),
            user: first_query.to_string(),
        };
        match model.complete(&turn, &ChatOptions::default()).await {
            Ok(title) => {
                let title = title.trim().trim_matches('"').to_string();
                if !title.is_empty() {
                    if let Err(err) = session.set_title(&self.services.db, title).await {
                        warn!(error = %err, "failed to persist generated session title");
                    }
                }
            }
            Err(err) => warn!(error = %err, "session title generation failed"),
        }
    }

    /// Runs one chat turn, streaming deltas through `response_tx` as they
    /// arrive and returning the finished assistant message once the
    /// pipeline completes.
    pub async fn run(
        &self,
        session: Session,
        kb: KnowledgeBase,
        query: String,
        response_tx: mpsc::Sender<SseEvent>,
    ) -> Result<Message, AppError> {
        let history = Message::history_for_session(
            &self.services.db,
            &session.id,
            session.retrieval.max_rounds,
        )
        .await?;

        let user_message =
            Message::new_user(session.tenant_id.clone(), session.id.clone(), query.clone(), Uuid::new_v4().to_string());
        self.services.db.store_item(user_message.clone()).await.map_err(AppError::Database)?;

        let request_id = Uuid::new_v4().to_string();
        let mut assistant_message = Message::new_pending_assistant(
            session.tenant_id.clone(),
            session.id.clone(),
            request_id.clone(),
        );
        self.services
            .db
            .store_item(assistant_message.clone())
            .await
            .map_err(AppError::Database)?;

        self.services
            .streams
            .register_stream(&session.id, &request_id, query.clone())
            .await;

        let mut ctx = ChatManage::new(
            self.services.clone(),
            session,
            kb,
            request_id.clone(),
            query,
            history,
            Some(response_tx),
        );

        self.driver.run(config::RAG_STREAM, &mut ctx).await;

        self.services
            .streams
            .complete_stream(&ctx.session.id, &request_id)
            .await?;

        assistant_message
            .complete(&self.services.db, ctx.chat_response.clone(), ctx.merge_result.clone())
            .await?;

        Ok(assistant_message)
    }
}

/// `SearchKnowledge(kb_id, query)`: runs retrieval/merge with no LLM call
/// and returns the ranked context directly (SPEC_FULL §4.6).
pub struct SearchKnowledge {
    services: PipelineServices,
    driver: PipelineDriver,
}

impl SearchKnowledge {
    #[must_use]
    pub fn new(services: PipelineServices, stage_timeout: Duration) -> Self {
        Self {
            driver: PipelineDriver::new(stage_timeout),
            services,
        }
    }

    pub async fn run(
        &self,
        session: Session,
        kb: KnowledgeBase,
        query: String,
    ) -> Result<Vec<KnowledgeReference>, AppError> {
        let request_id = Uuid::new_v4().to_string();
        let mut ctx = ChatManage::new(
            self.services.clone(),
            session,
            kb,
            request_id,
            query,
            Vec::new(),
            None,
        );

        self.driver.run(config::RAG, &mut ctx).await;

        if let Some(error) = ctx.error {
            return Err(AppError::InternalError(error));
        }
        Ok(ctx.merge_result)
    }
}
