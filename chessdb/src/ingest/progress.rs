use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::store::helpers::now_timestamp;

/// Point-in-time view of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    /// Games with a final outcome so far (`imported + failed`).
    pub total_processed: u64,
    pub imported: u64,
    pub failed: u64,
    /// "White vs Black" of the game that produced this snapshot.
    pub current_game: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ImportStatus {
    Completed,
    Cancelled,
    /// At least one batch transaction failed.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    #[serde(flatten)]
    pub status: ImportStatus,
    pub imported: u64,
    pub failed: u64,
    /// Games decoded but never handed to a writer because the import was
    /// cancelled.
    pub discarded: u64,
}

/// Shared outcome counters. Writers only add to `imported` after a commit.
#[derive(Debug, Default)]
pub(crate) struct ImportCounters {
    imported: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl ImportCounters {
    pub(crate) fn add_imported(&self, n: u64) {
        self.imported.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_discarded(&self, n: u64) {
        self.discarded.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn imported(&self) -> u64 {
        self.imported.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// Sends progress snapshots without ever blocking the pipeline: a snapshot
/// that does not fit in the channel is dropped.
#[derive(Clone, Debug)]
pub(crate) struct ProgressReporter {
    counters: Arc<ImportCounters>,
    tx: Option<mpsc::Sender<ImportProgress>>,
}

impl ProgressReporter {
    pub(crate) fn new(
        counters: Arc<ImportCounters>,
        tx: Option<mpsc::Sender<ImportProgress>>,
    ) -> Self {
        Self { counters, tx }
    }

    pub(crate) fn counters(&self) -> &ImportCounters {
        &self.counters
    }

    pub(crate) fn snapshot(&self, current_game: &str) -> ImportProgress {
        let imported = self.counters.imported();
        let failed = self.counters.failed();
        ImportProgress {
            total_processed: imported + failed,
            imported,
            failed,
            current_game: current_game.to_string(),
            timestamp: now_timestamp(),
        }
    }

    pub(crate) fn report(&self, current_game: &str) {
        if let Some(tx) = &self.tx {
            if tx.try_send(self.snapshot(current_game)).is_err() {
                tracing::trace!("Progress channel full, snapshot dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_totals() {
        let counters = Arc::new(ImportCounters::default());
        counters.add_imported(3);
        counters.add_failed(2);
        let reporter = ProgressReporter::new(counters, None);
        let snapshot = reporter.snapshot("A vs B");
        assert_eq!(snapshot.total_processed, 5);
        assert_eq!(snapshot.imported, 3);
        assert_eq!(snapshot.failed, 2);
        assert_eq!(snapshot.current_game, "A vs B");
    }

    #[test]
    fn test_full_channel_drops_snapshots() {
        let (tx, mut rx) = mpsc::channel(1);
        let reporter = ProgressReporter::new(Arc::new(ImportCounters::default()), Some(tx));
        reporter.report("first");
        reporter.report("second");
        assert_eq!(rx.try_recv().unwrap().current_game, "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_summary_serialization() {
        let summary = ImportSummary {
            status: ImportStatus::Failed {
                error: "disk full".to_string(),
            },
            imported: 10,
            failed: 4,
            discarded: 2,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "disk full");
        assert_eq!(json["imported"], 10);
        assert_eq!(json["discarded"], 2);
    }
}
