//! Sending files, directly or through a running ferryd.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use ferry_core::config::FerryConfig;
use ferry_services::{ChannelSink, Sender, SenderConfig, TransferRequest};

use super::http::{base_url, post_json_body};
use super::progress::print_events;

/// Send each file on its own connection, all at once. Returns the number of
/// files that failed.
pub async fn cmd_send(files: &[String], host: &str, port: u16, json: bool) -> Result<usize> {
    let config = FerryConfig::load().unwrap_or_default();
    let (sink, rx) = ChannelSink::new();
    let sender = Sender::new(SenderConfig::from(&config), Arc::new(sink));

    let printer = tokio::spawn(print_events(rx, json));

    let tasks: Vec<_> = files
        .iter()
        .map(|file| sender.spawn(TransferRequest::new(file, host, port)).1)
        .collect();
    // Every sink clone must go before the printer can see the channel close.
    drop(sender);

    let mut failed = 0;
    for result in futures::future::join_all(tasks).await {
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => failed += 1,
            Err(e) => {
                eprintln!("send task panicked: {e}");
                failed += 1;
            }
        }
    }
    printer.await?;

    if !json {
        println!("{} of {} file(s) sent", files.len() - failed, files.len());
    }
    Ok(failed)
}

#[derive(Serialize)]
struct PushRequest<'a> {
    path: std::path::PathBuf,
    host: &'a str,
    port: u16,
}

#[derive(Deserialize)]
struct PushResponse {
    transfer_id: String,
    target: String,
}

/// Ask ferryd to send files on our behalf. Progress shows up in `transfers`.
pub async fn cmd_push(api_port: u16, files: &[String], host: &str, port: u16) -> Result<()> {
    for file in files {
        let path = std::fs::canonicalize(file).unwrap_or_else(|_| file.into());
        let resp: PushResponse = post_json_body(
            &format!("{}/send", base_url(api_port)),
            &PushRequest { path, host, port },
        )
        .await?;
        println!("{} → {} queued as {}", file, resp.target, resp.transfer_id);
    }
    Ok(())
}
