use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    Extension, Json,
};
use common::storage::types::{session::Session, tenant::Tenant};
use retrieval_pipeline::{session::KnowledgeQA, SseEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{api_state::ApiState, error::ApiError, routes::knowledge_bases::load_owned_kb};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

/// Runs the full retrieval+generation pipeline for one turn and streams
/// every emitted `SseEvent` back as it's produced. The pipeline run itself
/// is spawned onto its own task so a client disconnect (dropping the
/// receiver) doesn't abort the in-flight generation — it keeps writing to
/// the stream manager, which is what `continue_stream` reattaches to.
pub async fn knowledge_chat(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(session_id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = Session::get_owned(&state.db, &session_id, &tenant.id).await?;
    let kb = load_owned_kb(&state, &tenant, &session.kb_id).await?;

    let services = state.pipeline_services();
    let stage_timeout = Duration::from_secs(state.config.stage_timeout_secs);
    let qa = KnowledgeQA::new(services, stage_timeout);

    let (tx, mut rx) = mpsc::channel::<SseEvent>(64);

    tokio::spawn(async move {
        if let Err(err) = qa.run(session, kb, body.query, tx).await {
            warn!(error = %err, "knowledge chat run failed");
        }
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match Event::default().json_data(&event) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(err) => warn!(error = %err, "failed to encode sse event"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct ContinueStreamParams {
    pub message_id: String,
}

/// Reattaches to an in-flight or just-finished generation by polling the
/// process-local stream manager, replaying content as it accumulates
/// rather than requiring the caller to have been attached from the start.
pub async fn continue_stream(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    Path(session_id): Path<String>,
    Query(params): Query<ContinueStreamParams>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    Session::get_owned(&state.db, &session_id, &tenant.id).await?;

    let poll_interval = Duration::from_millis(state.config.stream_reattach_poll_ms);
    let request_id = params.message_id;

    let stream = async_stream::stream! {
        let mut sent_len = 0usize;
        let mut sent_references = false;
        loop {
            let Some(record) = state.streams.get_stream(&session_id, &request_id).await else {
                let event = SseEvent::terminal_error(request_id.clone(), "stream not found".to_string());
                if let Ok(sse_event) = Event::default().json_data(&event) {
                    yield Ok(sse_event);
                }
                break;
            };

            if !sent_references && !record.references.is_empty() {
                sent_references = true;
                let event = SseEvent::references(request_id.clone(), record.references.clone());
                if let Ok(sse_event) = Event::default().json_data(&event) {
                    yield Ok(sse_event);
                }
            }

            if record.accumulated_content.len() > sent_len {
                let delta = record.accumulated_content[sent_len..].to_string();
                sent_len = record.accumulated_content.len();
                let event = SseEvent::answer_delta(request_id.clone(), delta);
                if let Ok(sse_event) = Event::default().json_data(&event) {
                    yield Ok(sse_event);
                }
            }

            if record.is_completed {
                let event = SseEvent::done(request_id.clone());
                if let Ok(sse_event) = Event::default().json_data(&event) {
                    yield Ok(sse_event);
                }
                break;
            }

            tokio::time::sleep(poll_interval).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default()))
}
