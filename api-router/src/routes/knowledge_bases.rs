use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use common::{
    error::AppError,
    storage::types::{
        knowledge_base::{KnowledgeBase, RetrievalBackendKind},
        session::Session,
        tenant::Tenant,
    },
    task::queue::{TaskKind, TaskPriority},
};
use retrieval_pipeline::session::SearchKnowledge;
use serde::Deserialize;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

/// Request body for provisioning a knowledge base. Not itself named in the
/// route list below, but every other KB-scoped route takes a `:id` that has
/// to come from somewhere, so a minimal creation endpoint is included
/// alongside them.
#[derive(Debug, Deserialize)]
pub struct CreateKnowledgeBaseRequest {
    pub name: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
    #[serde(default)]
    pub multimodal: bool,
    pub embedding_model: String,
    pub embedding_dimension: u32,
    pub chat_model: String,
    #[serde(default)]
    pub rerank_model: Option<String>,
    #[serde(default = "default_backend")]
    pub backend: RetrievalBackendKind,
    #[serde(default)]
    pub graph_extraction_template: Option<String>,
}

fn default_chunk_size() -> u32 {
    1024
}

fn default_chunk_overlap() -> u32 {
    128
}

fn default_separators() -> Vec<String> {
    vec!["\n\n".to_string(), "\n".to_string()]
}

fn default_backend() -> RetrievalBackendKind {
    RetrievalBackendKind::Relational
}

pub async fn create_knowledge_base(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Json(body): Json<CreateKnowledgeBaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kb = KnowledgeBase::new(
        tenant.id.clone(),
        body.name,
        body.chunk_size,
        body.chunk_overlap,
        body.separators,
        body.multimodal,
        body.embedding_model,
        body.embedding_dimension,
        body.chat_model,
        body.rerank_model,
        body.backend,
        body.graph_extraction_template,
    )
    .map_err(|err| AppError::Validation(err.to_string()))?;

    state.db.store_item(kb.clone()).await?;

    Ok((StatusCode::CREATED, Json(kb)))
}

#[derive(Debug, Deserialize)]
pub struct HybridSearchParams {
    pub query_text: String,
    #[serde(default = "default_match_count")]
    pub match_count: u32,
    pub vector_threshold: Option<f32>,
    pub keyword_threshold: Option<f32>,
}

fn default_match_count() -> u32 {
    8
}

/// LLM-free hybrid search scoped to a single KB. Reuses the query
/// pipeline's retrieval-only stage list via a throwaway, never-persisted
/// `Session` whose `retrieval` strategy carries the caller's thresholds.
pub async fn hybrid_search(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(kb_id): Path<String>,
    Query(params): Query<HybridSearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let kb = load_owned_kb(&state, &tenant, &kb_id).await?;

    let mut session = Session::new(tenant.id.clone(), kb_id, kb.chat_model.clone());
    session.retrieval.vector_top_k = params.match_count;
    session.retrieval.keyword_top_k = params.match_count;
    session.retrieval.rerank_top_k = params.match_count;
    if let Some(threshold) = params.vector_threshold {
        session.retrieval.vector_threshold = threshold;
    }
    if let Some(threshold) = params.keyword_threshold {
        session.retrieval.keyword_threshold = threshold;
    }

    let services = state.pipeline_services();
    let search = SearchKnowledge::new(
        services,
        Duration::from_secs(state.config.stage_timeout_secs),
    );
    let references = search.run(session, kb, params.query_text).await?;

    Ok(Json(json!({ "success": true, "references": references })))
}

#[derive(Debug, Deserialize)]
pub struct CopyKnowledgeBaseRequest {
    pub source_id: String,
    pub target_id: String,
}

/// Enqueues an async `IndexCopy` task; the destination KB must already
/// exist (created via `create_knowledge_base`) and is left untouched here
/// beyond the enqueue.
pub async fn copy_knowledge_base(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Json(body): Json<CopyKnowledgeBaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load_owned_kb(&state, &tenant, &body.source_id).await?;
    load_owned_kb(&state, &tenant, &body.target_id).await?;

    let payload = json!({
        "source_kb_id": body.source_id,
        "dest_kb_id": body.target_id,
    });
    let task = state
        .task_queue
        .enqueue(tenant.id, TaskKind::IndexCopy, TaskPriority::Low, payload)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(task)))
}

pub(crate) async fn load_owned_kb(
    state: &ApiState,
    tenant: &Tenant,
    kb_id: &str,
) -> Result<KnowledgeBase, AppError> {
    let kb: Option<KnowledgeBase> = state.db.get_item(kb_id).await?;
    let kb = kb.ok_or_else(|| AppError::NotFound(format!("knowledge base {kb_id}")))?;
    if kb.tenant_id != tenant.id {
        return Err(AppError::Forbidden(format!(
            "knowledge base {kb_id} belongs to another tenant"
        )));
    }
    Ok(kb)
}
