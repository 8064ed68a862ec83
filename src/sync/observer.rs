use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::article::DedupKey;
use crate::storage::WriteOutcome;
use crate::sync::{StopReason, SyncMode};

/// Something the engine did that an operator may want to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ModeSelected {
        mode: SyncMode,
        known: usize,
    },
    PageScanned {
        page_index: usize,
        new: usize,
        known: usize,
    },
    ScanStopped {
        reason: StopReason,
        pages_scanned: usize,
    },
    SummarySkipped {
        url: String,
        reason: String,
    },
    ArticleCaptured {
        key: DedupKey,
        title: String,
        content_len: usize,
    },
    ArticleFailed {
        url: String,
        error: String,
    },
    StoreWritten {
        mode: SyncMode,
        outcome: WriteOutcome,
    },
}

/// Receives engine events. Passed to the engine explicitly.
pub trait SyncObserver: Send + Sync {
    fn observe(&self, event: SyncEvent);
}

/// Turns events into `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn observe(&self, event: SyncEvent) {
        match event {
            SyncEvent::ModeSelected { mode, known } => {
                info!(%mode, known, "Starting sync");
            }
            SyncEvent::PageScanned { page_index, new, known } => {
                info!(page_index, new, known, "Scanned listing page");
            }
            SyncEvent::ScanStopped { reason, pages_scanned } => {
                info!(%reason, pages_scanned, "Stopped scanning");
            }
            SyncEvent::SummarySkipped { url, reason } => {
                warn!(%url, %reason, "Skipped listing entry");
            }
            SyncEvent::ArticleCaptured { key, title, content_len } => {
                if content_len == 0 {
                    info!(%key, %title, "Captured article with no extractable body");
                } else {
                    debug!(%key, %title, content_len, "Captured article");
                }
            }
            SyncEvent::ArticleFailed { url, error } => {
                warn!(%url, %error, "Article fetch failed, aborting run");
            }
            SyncEvent::StoreWritten { mode, outcome } => match outcome {
                WriteOutcome::Written(count) => info!(%mode, count, "Store updated"),
                WriteOutcome::EmptyWritePrevented => warn!(%mode, "Store left untouched, nothing to write"),
            },
        }
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    pub fn pages_scanned(&self) -> Vec<usize> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SyncEvent::PageScanned { page_index, .. } => Some(*page_index),
                _ => None,
            })
            .collect()
    }
}

impl SyncObserver for RecordingObserver {
    fn observe(&self, event: SyncEvent) {
        self.events.lock().push(event);
    }
}
