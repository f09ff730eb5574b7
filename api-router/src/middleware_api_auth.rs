use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use common::{error::AppError, storage::types::tenant::Tenant};

use crate::{api_state::ApiState, error::ApiError};

/// Minimal tenant resolution: the `X-API-Key`/bearer token IS the tenant id.
/// Tenant provisioning and real API-key issuance are out of scope here; this
/// only confirms the id names a tenant that exists before letting a request
/// through, and hands the resolved `Tenant` to handlers via extensions.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let tenant_id = extract_api_key(&request)
        .ok_or_else(|| ApiError::from(AppError::Auth("missing API key".to_string())))?;

    let tenant: Option<Tenant> = state
        .db
        .get_item(&tenant_id)
        .await
        .map_err(AppError::Database)?;
    let tenant =
        tenant.ok_or_else(|| ApiError::from(AppError::Auth("unknown API key".to_string())))?;

    request.extensions_mut().insert(tenant);

    Ok(next.run(request).await)
}

fn extract_api_key(request: &Request) -> Option<String> {
    request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer ").map(str::trim))
        })
        .map(String::from)
}
