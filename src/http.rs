use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{
    cache::HookCache,
    error::HookError,
    hook::{ComplianceHook, FailurePolicy, PreCallHook},
    types::{CallType, CallerIdentity, PreCallRequest},
};

#[derive(Clone)]
pub struct AppState {
    pub hook: Arc<ComplianceHook>,
    pub cache: Arc<dyn HookCache>,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Deserialize)]
pub struct PreCallBody {
    pub call_type: CallType,
    #[serde(default)]
    pub caller: CallerIdentity,
    /// Kept raw so a body the hook cannot read still reaches the failure
    /// policy.
    pub data: Value,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/hooks/pre-call", post(pre_call))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn pre_call(
    State(state): State<AppState>,
    Json(body): Json<PreCallBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let original = body.data;
    let result = match serde_json::from_value::<PreCallRequest>(original.clone()) {
        Ok(request) => state
            .hook
            .pre_call_hook(&body.caller, state.cache.as_ref(), request, body.call_type)
            .await
            .and_then(|request| {
                serde_json::to_value(request)
                    .map_err(|error| HookError::InvalidRequest(error.to_string()))
            }),
        Err(error) => Err(HookError::InvalidRequest(error.to_string())),
    };

    let data = state
        .failure_policy
        .resolve(original, result, state.hook.compliance_model_id())
        .map_err(service_error)?;

    Ok(Json(data))
}

fn service_error(error: HookError) -> (StatusCode, Json<Value>) {
    warn!(%error, "rejecting request after compliance check error");
    let status =
        StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "detail": "Error in compliance check" })))
}
