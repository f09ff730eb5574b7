use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::{
    error::AppError,
    storage::types::{
        chunk::Chunk,
        index_entry::IndexEntry,
        knowledge::Knowledge,
        knowledge_base::{KnowledgeBase, RetrievalBackendKind},
        tenant::Tenant,
    },
    task::queue::{TaskKind, TaskPriority},
};
use serde::Deserialize;
use serde_json::json;
use tempfile::NamedTempFile;

use crate::{api_state::ApiState, error::ApiError, routes::knowledge_bases::load_owned_kb};

fn engine_type_for(backend: RetrievalBackendKind) -> Option<&'static str> {
    match backend {
        RetrievalBackendKind::Relational => Some("surreal_relational"),
        RetrievalBackendKind::InvertedIndex => Some("tantivy_inverted_index"),
        RetrievalBackendKind::Graph => None,
    }
}

fn task_kind_for_size(size: usize, threshold: usize) -> TaskKind {
    if size > threshold {
        TaskKind::LargeIngest
    } else {
        TaskKind::ChunkExtract
    }
}

#[derive(Debug, TryFromMultipart)]
pub struct UploadFileRequest {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<NamedTempFile>,
    pub metadata: Option<String>,
    #[form_data(default)]
    pub enable_multimodal: bool,
}

pub async fn upload_file(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(kb_id): Path<String>,
    TypedMultipart(input): TypedMultipart<UploadFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let _ = input.metadata;
    let kb = load_owned_kb(&state, &tenant, &kb_id).await?;

    let file_name = input
        .file
        .metadata
        .file_name
        .clone()
        .ok_or_else(|| AppError::Validation("missing file name".to_string()))?;
    let mime_type = input
        .file
        .metadata
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(AppError::Io)?;
    let file_hash = Knowledge::sha256_hex(&bytes);

    if let Some(existing) = Knowledge::find_duplicate_by_hash(&state.db, &kb_id, &file_hash).await?
    {
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({ "success": false, "existing": existing })),
        ));
    }

    let file_size = bytes.len() as u64;
    if tenant.would_exceed_quota(file_size) {
        return Err(AppError::QuotaExceeded(format!("tenant {} over storage quota", tenant.id)).into());
    }

    let storage_path = format!("{}/{kb_id}/{}-{file_name}", tenant.id, uuid::Uuid::new_v4());
    state
        .storage
        .put(&storage_path, Bytes::from(bytes))
        .await
        .map_err(AppError::ObjectStore)?;

    let mut knowledge = Knowledge::new_file(
        tenant.id.clone(),
        kb_id.clone(),
        file_name,
        file_hash,
        file_size,
        mime_type,
        storage_path,
    );
    knowledge.storage_size_bytes = file_size;
    state.db.store_item(knowledge.clone()).await?;

    let kind = task_kind_for_size(file_size as usize, state.config.ingest_max_content_bytes);
    let payload = json!({ "knowledge_id": knowledge.id, "kb_id": kb_id });
    let _ = kb;
    let _ = input.enable_multimodal;
    state
        .task_queue
        .enqueue(tenant.id, kind, TaskPriority::Default, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "knowledge": knowledge }))))
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub url: String,
    #[serde(default)]
    pub enable_multimodal: bool,
}

pub async fn upload_url(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(kb_id): Path<String>,
    Json(body): Json<UploadUrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load_owned_kb(&state, &tenant, &kb_id).await?;

    if let Some(existing) = Knowledge::find_duplicate_by_url(&state.db, &kb_id, &body.url).await? {
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({ "success": false, "existing": existing })),
        ));
    }

    let knowledge = Knowledge::new_url(tenant.id.clone(), kb_id.clone(), body.url);
    state.db.store_item(knowledge.clone()).await?;

    let payload = json!({ "knowledge_id": knowledge.id, "kb_id": kb_id });
    let _ = body.enable_multimodal;
    state
        .task_queue
        .enqueue(tenant.id, TaskKind::ChunkExtract, TaskPriority::Default, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "knowledge": knowledge }))))
}

/// Removes a knowledge item along with its chunks and indexed entries, and
/// releases the tenant storage it was holding. The underlying blob (if any)
/// is deleted too — unlike a *failed ingestion's* blob, which is kept for
/// diagnostics, an explicitly deleted knowledge item has no further
/// diagnostic value.
pub async fn delete_knowledge(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(knowledge_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let knowledge: Option<Knowledge> = state.db.get_item(&knowledge_id).await?;
    let knowledge =
        knowledge.ok_or_else(|| AppError::NotFound(format!("knowledge {knowledge_id}")))?;
    if knowledge.tenant_id != tenant.id {
        return Err(AppError::Forbidden(format!(
            "knowledge {knowledge_id} belongs to another tenant"
        ))
        .into());
    }

    let kb: Option<KnowledgeBase> = state.db.get_item(&knowledge.kb_id).await?;

    Chunk::delete_by_knowledge_id(&state.db, &knowledge_id).await?;
    IndexEntry::delete_by_knowledge_ids(&state.db, std::slice::from_ref(&knowledge_id)).await?;

    if let Some(kb) = kb {
        if let Some(engine_type) = engine_type_for(kb.backend) {
            if let Some(engine) = state.engines.get(engine_type) {
                engine
                    .delete_by_knowledge_ids(std::slice::from_ref(&knowledge_id))
                    .await?;
            }
        }
        if let Some(graph) = state.engines.graph() {
            graph
                .del_graph(std::slice::from_ref(&knowledge_id))
                .await?;
        }
    }

    if let common::storage::types::knowledge::KnowledgeSource::File { storage_path, .. } =
        &knowledge.source
    {
        let _ = state.storage.delete_prefix(storage_path).await;
    }

    Tenant::release_usage(&state.db, &tenant.id, knowledge.storage_size_bytes).await?;
    state.db.delete_item::<Knowledge>(&knowledge_id).await?;

    Ok((StatusCode::OK, Json(json!({ "success": true }))))
}
