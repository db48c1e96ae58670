//! Draining worker results and deciding the session's fate
//!
//! The collector settles when every dispatched part has reported, or when the
//! result channel closes because every worker has exited. Parts that never
//! reported are counted as missing, so a pool that dies mid-queue ends in an
//! abort instead of a hang.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::worker::{ResultReceiver, WorkResult, WorkerAction};

/// A failure reported by a worker
#[derive(Debug)]
pub struct PartFailure {
    pub worker_id: usize,
    pub conjoined_part: Option<u32>,
    pub action: WorkerAction,
    pub error: String,
}

/// Aggregate outcome of one upload's parts
#[derive(Debug, Default)]
pub struct UploadSummary {
    /// Archived parts and their sizes
    pub archived: BTreeMap<u32, u64>,
    pub failures: Vec<PartFailure>,
    /// Workers that died before taking a part (Open failures)
    pub worker_deaths: Vec<PartFailure>,
    /// Dispatched parts that never reported
    pub missing: Vec<u32>,
    /// Reports for parts already reported or never dispatched
    pub unexpected: Vec<u32>,
    pub expected: usize,
}

impl UploadSummary {
    /// True only if every dispatched part archived exactly once.
    ///
    /// Worker deaths with no part do not count: their parts either archived on
    /// another worker or show up as missing.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
            && self.missing.is_empty()
            && self.unexpected.is_empty()
            && self.archived.len() == self.expected
    }

    pub fn bytes_archived(&self) -> u64 {
        self.archived.values().sum()
    }

    /// Parts that did not archive
    pub fn failed_count(&self) -> usize {
        self.expected.saturating_sub(self.archived.len()).max(
            self.failures.len() + self.missing.len() + self.unexpected.len(),
        )
    }
}

/// Tracks expected parts against worker reports
pub struct ResultCollector {
    pending: BTreeSet<u32>,
    summary: UploadSummary,
}

impl ResultCollector {
    /// Expect one report for each of `parts`
    pub fn new(parts: impl IntoIterator<Item = u32>) -> Self {
        let pending: BTreeSet<u32> = parts.into_iter().collect();
        let summary = UploadSummary {
            expected: pending.len(),
            ..Default::default()
        };
        Self { pending, summary }
    }

    /// True once every expected part has reported
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record one worker report
    pub fn record(&mut self, result: WorkResult) {
        if let Some(part) = result.conjoined_part {
            if !self.pending.remove(&part) {
                warn!(
                    worker = result.worker_id,
                    part, "report for a part that is not pending"
                );
                self.summary.unexpected.push(part);
                return;
            }
        }

        match result.failure {
            None => {
                if let Some(part) = result.conjoined_part {
                    debug!(worker = result.worker_id, part, "part reported archived");
                    self.summary.archived.insert(part, result.size);
                }
            }
            Some(failure) => {
                let failure = PartFailure {
                    worker_id: result.worker_id,
                    conjoined_part: result.conjoined_part,
                    action: failure.action,
                    error: failure.error.to_string(),
                };
                if failure.conjoined_part.is_some() {
                    self.summary.failures.push(failure);
                } else {
                    self.summary.worker_deaths.push(failure);
                }
            }
        }
    }

    /// Receive until settled or until every worker has gone
    pub async fn drain(mut self, results: &mut ResultReceiver) -> UploadSummary {
        while !self.is_settled() {
            match results.recv().await {
                Some(result) => self.record(result),
                None => break,
            }
        }
        self.finish()
    }

    /// Close collection; anything still pending is missing
    pub fn finish(mut self) -> UploadSummary {
        if !self.pending.is_empty() {
            warn!(
                missing = self.pending.len(),
                "workers exited before every part was reported"
            );
        }
        self.summary.missing = std::mem::take(&mut self.pending).into_iter().collect();
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NimbusError;
    use crate::upload::worker::WorkFailure;
    use tokio::sync::mpsc;

    fn archived(worker_id: usize, part: u32, size: u64) -> WorkResult {
        WorkResult {
            worker_id,
            conjoined_part: Some(part),
            size,
            version_identifier: Some(format!("v{part}")),
            failure: None,
        }
    }

    fn failed(worker_id: usize, part: Option<u32>, action: WorkerAction) -> WorkResult {
        WorkResult {
            worker_id,
            conjoined_part: part,
            size: 0,
            version_identifier: None,
            failure: Some(WorkFailure {
                action,
                error: NimbusError::Internal {
                    message: "boom".into(),
                },
            }),
        }
    }

    #[test]
    fn test_all_parts_archived() {
        let mut collector = ResultCollector::new(0..3);
        collector.record(archived(0, 2, 10));
        collector.record(archived(1, 0, 10));
        assert!(!collector.is_settled());
        collector.record(archived(0, 1, 5));
        assert!(collector.is_settled());

        let summary = collector.finish();
        assert!(summary.is_success());
        assert_eq!(summary.bytes_archived(), 25);
        assert_eq!(summary.failed_count(), 0);
    }

    #[test]
    fn test_single_failure_fails_upload() {
        let mut collector = ResultCollector::new(0..2);
        collector.record(archived(0, 0, 10));
        collector.record(failed(1, Some(1), WorkerAction::Archive));

        let summary = collector.finish();
        assert!(!summary.is_success());
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].action, WorkerAction::Archive);
        assert_eq!(summary.failed_count(), 1);
    }

    #[test]
    fn test_duplicate_report_fails_upload() {
        let mut collector = ResultCollector::new(0..1);
        collector.record(archived(0, 0, 10));
        collector.record(archived(1, 0, 10));

        let summary = collector.finish();
        assert!(!summary.is_success());
        assert_eq!(summary.unexpected, vec![0]);
    }

    #[test]
    fn test_open_failure_does_not_settle_part() {
        let mut collector = ResultCollector::new(0..1);
        collector.record(failed(3, None, WorkerAction::Open));
        assert!(!collector.is_settled());

        let summary = collector.finish();
        assert!(!summary.is_success());
        assert_eq!(summary.missing, vec![0]);
        assert_eq!(summary.worker_deaths.len(), 1);
        assert!(summary.failures.is_empty());
    }

    #[test]
    fn test_open_failure_with_all_parts_archived_succeeds() {
        let mut collector = ResultCollector::new(0..2);
        collector.record(failed(2, None, WorkerAction::Open));
        collector.record(archived(0, 0, 10));
        collector.record(archived(1, 1, 10));
        assert!(collector.is_settled());

        let summary = collector.finish();
        assert!(summary.is_success());
        assert_eq!(summary.worker_deaths.len(), 1);
        assert_eq!(summary.worker_deaths[0].action, WorkerAction::Open);
        assert_eq!(summary.failed_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_stops_when_workers_gone() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(archived(0, 0, 10)).await.unwrap();
        tx.send(failed(0, Some(1), WorkerAction::Seek)).await.unwrap();
        drop(tx);

        let summary = ResultCollector::new(0..4).drain(&mut rx).await;
        assert!(!summary.is_success());
        assert_eq!(summary.missing, vec![2, 3]);
        assert_eq!(summary.failed_count(), 3);
    }
}
