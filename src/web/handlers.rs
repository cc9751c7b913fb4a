//! HTTP request handlers.

use super::AppState;
use crate::sync::{ClusterContext, DeletionOutcome, EndpointAccess, SyncError};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Invalid input maps to 400, remote failures to `upstream`.
fn sync_error_response(err: &SyncError, upstream: StatusCode) -> Response {
    if err.is_invalid_input() {
        return error_response(StatusCode::BAD_REQUEST, err.to_string());
    }
    let status = err.probe_error().and_then(|e| e.status());
    tracing::warn!(error = %err, upstream_status = ?status, "Probe operation failed");
    error_response(upstream, err.to_string())
}

// ============================================================================
// API: Probes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EnsureProbeRequest {
    pub api_server_hostname: String,
    #[serde(default)]
    pub endpoint_access: EndpointAccess,
    #[serde(default)]
    pub management_cluster_id: Option<String>,
}

pub async fn handle_ensure_probe(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    Json(req): Json<EnsureProbeRequest>,
) -> impl IntoResponse {
    let mut ctx = ClusterContext::new(cluster_id, req.api_server_hostname, req.endpoint_access);
    ctx.management_cluster_id = req.management_cluster_id;

    match state.reconciler.ensure_probe(&ctx).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => sync_error_response(&e, StatusCode::BAD_GATEWAY),
    }
}

pub async fn handle_get_probe(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> impl IntoResponse {
    match state.reconciler.client().get_probe(&cluster_id).await {
        Ok(Some(probe)) => Json(probe).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("no probe for cluster {}", cluster_id),
        ),
        Err(e) => {
            tracing::warn!(cluster_id, error = %e, api_error = e.is_api_error(), "Probe lookup failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteProbeParams {
    /// RFC 3339 time the cluster deletion was requested; defaults to now.
    pub deletion_requested_at: Option<String>,
}

pub async fn handle_delete_probe(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    Query(params): Query<DeleteProbeParams>,
) -> impl IntoResponse {
    let requested_at = match params.deletion_requested_at.as_deref() {
        None => Utc::now(),
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("invalid deletion_requested_at {:?}: {}", raw, e),
                )
            }
        },
    };

    match state.deletion.delete_probe(&cluster_id, requested_at).await {
        Ok(outcome) => {
            let mut body = json!({ "outcome": outcome.as_str() });
            if let DeletionOutcome::FailOpen { error } = &outcome {
                body["error"] = json!(error.to_string());
            }
            Json(body).into_response()
        }
        Err(e) => sync_error_response(&e, StatusCode::SERVICE_UNAVAILABLE),
    }
}

// ============================================================================
// Operational endpoints
// ============================================================================

pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

pub async fn handle_healthz() -> impl IntoResponse {
    "ok"
}
