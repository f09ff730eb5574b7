use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use common::storage::types::{session::Session, tenant::Tenant};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError, routes::knowledge_bases::load_owned_kb};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub kb_id: String,
    pub summary_model: Option<String>,
}

pub async fn create_session(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kb = load_owned_kb(&state, &tenant, &body.kb_id).await?;
    let summary_model = body.summary_model.unwrap_or_else(|| kb.chat_model.clone());

    let session = Session::new(tenant.id, body.kb_id, summary_model);
    state.db.store_item(session.clone()).await?;

    Ok((StatusCode::CREATED, Json(session)))
}
