//! In-memory record of every transfer seen by this process.
//!
//! The registry is just another [`EventSink`]; it never influences a
//! transfer, it only remembers what the events said. Active transfers are
//! always kept. Finished ones are kept up to a limit, oldest evicted first.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;

use ferry_core::ErrorKind;

use crate::event::{EventSink, TransferEvent, TransferId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub id: TransferId,
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub peer: Option<String>,
    pub total_bytes: Option<u64>,
    pub bytes: u64,
    pub percent: u8,
    pub state: RecordState,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl TransferRecord {
    fn new(id: TransferId) -> Self {
        Self {
            id,
            name: None,
            path: None,
            peer: None,
            total_bytes: None,
            bytes: 0,
            percent: 0,
            state: RecordState::Active,
            error: None,
            error_kind: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferCounts {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Finished records kept when no limit is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct TransferRegistry {
    records: Arc<DashMap<TransferId, TransferRecord>>,
    /// Finished ids, oldest first.
    finished: Arc<Mutex<VecDeque<TransferId>>>,
    history_limit: usize,
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` completed or failed records.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            finished: Arc::new(Mutex::new(VecDeque::new())),
            history_limit: limit,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn get(&self, id: TransferId) -> Option<TransferRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// All records, ordered by id.
    pub fn snapshot(&self) -> Vec<TransferRecord> {
        let mut all: Vec<TransferRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }

    pub fn counts(&self) -> TransferCounts {
        self.records
            .iter()
            .fold(TransferCounts::default(), |mut acc, r| {
                match r.state {
                    RecordState::Active => acc.active += 1,
                    RecordState::Completed => acc.completed += 1,
                    RecordState::Failed => acc.failed += 1,
                }
                acc
            })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EventSink for TransferRegistry {
    fn emit(&self, event: TransferEvent) {
        let Some(id) = event.id() else {
            return;
        };
        if self.record(id, event) {
            self.finish(id);
        }
    }
}

impl TransferRegistry {
    /// Apply one event. True when it moved the record out of `Active`.
    fn record(&self, id: TransferId, event: TransferEvent) -> bool {
        let mut record = self
            .records
            .entry(id)
            .or_insert_with(|| TransferRecord::new(id));
        let was_active = record.state == RecordState::Active;

        match event {
            TransferEvent::Started {
                name,
                path,
                peer,
                total_bytes,
                ..
            } => {
                record.name = Some(name);
                record.path = Some(path);
                record.peer = Some(peer);
                record.total_bytes = Some(total_bytes);
            }
            TransferEvent::Progress { percent, bytes, .. } => {
                record.percent = record.percent.max(percent);
                record.bytes = bytes;
            }
            TransferEvent::Completed { path, bytes, .. } => {
                record.state = RecordState::Completed;
                record.percent = 100;
                record.bytes = bytes;
                // Outgoing completions carry the source, incoming the destination.
                record.path = Some(path);
            }
            TransferEvent::Failed {
                path,
                kind,
                message,
                ..
            } => {
                record.state = RecordState::Failed;
                record.error = Some(message);
                record.error_kind = Some(kind);
                if path.is_some() {
                    record.path = path;
                }
            }
            TransferEvent::ListenerStopped { .. } => {}
        }

        was_active && record.state != RecordState::Active
    }

    /// Queue a finished id and evict the oldest beyond the limit. Must run
    /// with no map entry held.
    fn finish(&self, id: TransferId) {
        let evicted: Vec<TransferId> = {
            let mut finished = match self.finished.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            finished.push_back(id);
            let excess = finished.len().saturating_sub(self.history_limit);
            finished.drain(..excess).collect()
        };
        for old in evicted {
            self.records.remove(&old);
        }
    }
}
