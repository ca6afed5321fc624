//! /transfers and /send handlers.

use std::path::PathBuf;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use ferry_core::wire::DEFAULT_PORT;
use ferry_services::{TransferId, TransferRecord, TransferRequest};

use super::ApiState;

// ── /transfers ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TransfersResponse {
    pub transfers: Vec<TransferRecord>,
}

pub async fn handle_transfers(State(state): State<ApiState>) -> Json<TransfersResponse> {
    Json(TransfersResponse {
        transfers: state.registry.snapshot(),
    })
}

// ── /send ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub path: PathBuf,
    pub host: String,
    pub port: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub id: TransferId,
    pub transfer_id: String,
    pub target: String,
}

/// Start an outbound send. Returns once the send is running; its outcome
/// shows up in `/transfers`.
pub async fn handle_send(
    State(state): State<ApiState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, (StatusCode, String)> {
    if req.host.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "host is required".to_string()));
    }
    match tokio::fs::metadata(&req.path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("{} is not a regular file", req.path.display()),
            ))
        }
        Err(e) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("cannot read {}: {e}", req.path.display()),
            ))
        }
    }

    let request = TransferRequest::new(req.path, req.host, req.port.unwrap_or(DEFAULT_PORT));
    let target = request.target();
    // The task reports through the registry; the handle is not needed here.
    let (id, _task) = state.sender.spawn(request);
    tracing::info!(%id, %target, "send requested via API");

    Ok(Json(SendResponse {
        id,
        transfer_id: id.to_string(),
        target,
    }))
}
