use std::time::Duration;

use axum::{extract::State, response::IntoResponse, Extension, Json};
use common::storage::types::{session::Session, tenant::Tenant};
use retrieval_pipeline::session::SearchKnowledge;
use serde::Deserialize;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError, routes::knowledge_bases::load_owned_kb};

#[derive(Debug, Deserialize)]
pub struct KnowledgeSearchRequest {
    pub knowledge_base_id: String,
    pub query: String,
}

/// Retrieval-only RAG: runs the same stage pipeline `knowledge_chat` uses
/// up through reranking/merging, but stops short of the chat-completion
/// stages, via `config::RAG` instead of `config::RAG_STREAM`.
pub async fn knowledge_search(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Json(body): Json<KnowledgeSearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kb = load_owned_kb(&state, &tenant, &body.knowledge_base_id).await?;
    let session = Session::new(tenant.id, body.knowledge_base_id, kb.chat_model.clone());

    let services = state.pipeline_services();
    let search = SearchKnowledge::new(
        services,
        Duration::from_secs(state.config.stage_timeout_secs),
    );
    let references = search.run(session, kb, body.query).await?;

    Ok(Json(json!({ "success": true, "references": references })))
}
