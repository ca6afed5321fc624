//! Terminal rendering of transfer events.

use std::collections::HashMap;

use ferry_services::{TransferEvent, TransferId};
use tokio::sync::mpsc::UnboundedReceiver;

/// Print every event until the channel closes. Returns the number of
/// transfers that failed.
pub async fn print_events(mut rx: UnboundedReceiver<TransferEvent>, json: bool) -> usize {
    let mut names: HashMap<TransferId, String> = HashMap::new();
    let mut failed = 0;

    while let Some(event) = rx.recv().await {
        if matches!(event, TransferEvent::Failed { .. }) {
            failed += 1;
        }
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("cannot encode event: {e}"),
            }
            continue;
        }

        match event {
            TransferEvent::Started {
                id,
                name,
                peer,
                total_bytes,
                ..
            } => {
                println!("[{id}] {name}: {total_bytes} bytes, peer {peer}");
                names.insert(id, name);
            }
            TransferEvent::Progress { id, percent, .. } => {
                println!("[{id}] {}: {percent}%", label(&names, id));
            }
            TransferEvent::Completed { id, path, bytes } => {
                println!("[{id}] done, {bytes} bytes ({})", path.display());
            }
            TransferEvent::Failed {
                id, path, message, ..
            } => match path {
                Some(path) if !names.contains_key(&id) => {
                    eprintln!("[{id}] {} failed: {message}", path.display());
                }
                _ => eprintln!("[{id}] {} failed: {message}", label(&names, id)),
            },
            TransferEvent::ListenerStopped { local_addr, error } => match error {
                Some(e) => eprintln!("listener on {local_addr} stopped: {e}"),
                None => println!("listener on {local_addr} stopped"),
            },
        }
    }
    failed
}

fn label(names: &HashMap<TransferId, String>, id: TransferId) -> &str {
    names.get(&id).map(String::as_str).unwrap_or("transfer")
}
