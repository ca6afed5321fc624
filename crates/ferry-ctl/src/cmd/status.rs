//! Daemon status, transfer list and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_empty};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    listen_addr: String,
    destination_dir: String,
    workers: WorkerInfo,
    transfers: TransferCounts,
}

#[derive(Deserialize)]
struct WorkerInfo {
    capacity: usize,
    busy: usize,
    queued: usize,
}

#[derive(Deserialize)]
struct TransferCounts {
    active: usize,
    completed: usize,
    failed: usize,
}

#[derive(Deserialize)]
struct TransfersResponse {
    transfers: Vec<TransferRecord>,
}

#[derive(Deserialize)]
struct TransferId {
    direction: String,
    seq: u64,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct TransferRecord {
    id: TransferId,
    name: Option<String>,
    path: Option<String>,
    peer: Option<String>,
    total_bytes: Option<u64>,
    bytes: u64,
    percent: u8,
    state: String,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Ferry Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Listening on     : {}", resp.listen_addr);
    println!("  Destination      : {}", resp.destination_dir);
    println!(
        "  Workers          : {} busy / {} ({} queued)",
        resp.workers.busy, resp.workers.capacity, resp.workers.queued
    );
    println!("  Active transfers : {}", resp.transfers.active);
    println!("  Completed        : {}", resp.transfers.completed);
    println!("  Failed           : {}", resp.transfers.failed);

    Ok(())
}

pub async fn cmd_transfers(port: u16) -> Result<()> {
    let resp: TransfersResponse = get_json(&format!("{}/transfers", base_url(port))).await?;

    if resp.transfers.is_empty() {
        println!("No transfers yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Transfers ({})", resp.transfers.len());
    println!("═══════════════════════════════════════");

    for t in &resp.transfers {
        let arrow = if t.id.direction == "incoming" { "in" } else { "out" };
        println!("  ┌─ {}-{}  {}", arrow, t.id.seq, t.name.as_deref().unwrap_or("?"));
        if let Some(peer) = &t.peer {
            println!("  │  peer     : {}", peer);
        }
        if let Some(path) = &t.path {
            println!("  │  path     : {}", path);
        }
        match t.total_bytes {
            Some(total) => println!("  │  progress : {}% ({}/{} bytes)", t.percent, t.bytes, total),
            None => println!("  │  progress : {}%", t.percent),
        }
        match &t.error {
            Some(e) => println!("  └─ state    : {} ({})", t.state, e),
            None => println!("  └─ state    : {}", t.state),
        }
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse = post_empty(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
