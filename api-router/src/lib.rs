use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    chat::{continue_stream, knowledge_chat},
    knowledge::{delete_knowledge, upload_file, upload_url},
    knowledge_bases::{copy_knowledge_base, create_knowledge_base, hybrid_search},
    liveness::live,
    readiness::ready,
    search::knowledge_search,
    sessions::create_session,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Protected API endpoints (require a resolved tenant)
    let protected = Router::new()
        .route("/knowledge-bases", post(create_knowledge_base))
        .route("/knowledge-bases/copy", post(copy_knowledge_base))
        .route("/knowledge-bases/:id/hybrid-search", get(hybrid_search))
        .route(
            "/knowledge-bases/:id/knowledge/file",
            post(upload_file).layer(DefaultBodyLimit::max(app_state.config.ingest_max_body_bytes)),
        )
        .route("/knowledge-bases/:id/knowledge/url", post(upload_url))
        .route("/knowledge/:id", delete(delete_knowledge))
        .route("/sessions", post(create_session))
        .route("/knowledge-chat/:session_id", post(knowledge_chat))
        .route(
            "/sessions/continue-stream/:session_id",
            get(continue_stream),
        )
        .route("/knowledge-search", post(knowledge_search))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
