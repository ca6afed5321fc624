//! /status and /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use ferry_services::TransferCounts;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub listen_addr: String,
    pub destination_dir: String,
    pub workers: WorkerInfo,
    pub transfers: TransferCounts,
}

#[derive(Serialize)]
pub struct WorkerInfo {
    pub capacity: usize,
    pub busy: usize,
    pub queued: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        listen_addr: state.listen_addr.to_string(),
        destination_dir: state.destination_dir.display().to_string(),
        workers: WorkerInfo {
            capacity: state.pool.capacity(),
            busy: state.pool.busy(),
            queued: state.pool.queued(),
        },
        transfers: state.registry.counts(),
    })
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    // Err means shutdown is already under way.
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
