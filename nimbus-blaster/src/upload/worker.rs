//! Upload worker
//!
//! Each worker opens the source file once, then pulls work units from the
//! shared queue until it closes. Any Open, Seek or Archive failure ends the
//! worker after it reports exactly one failed result.

use std::fmt;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::partition::WorkUnit;
use crate::error::NimbusError;
use crate::metrics::standard;
use crate::storage::{archive, ConjoinedParams, Requester};

/// Multi-consumer end of the work queue
pub type WorkQueue = Arc<Mutex<mpsc::Receiver<WorkUnit>>>;

/// Sender half of the work queue; dropping it closes the queue
pub type WorkSender = mpsc::Sender<WorkUnit>;

pub type ResultSender = mpsc::Sender<WorkResult>;
pub type ResultReceiver = mpsc::Receiver<WorkResult>;

/// Step a worker was performing when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerAction {
    Open,
    Seek,
    Archive,
}

impl WorkerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerAction::Open => "Open",
            WorkerAction::Seek => "Seek",
            WorkerAction::Archive => "Archive",
        }
    }
}

impl fmt::Display for WorkerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a worker stopped
#[derive(Debug)]
pub struct WorkFailure {
    pub action: WorkerAction,
    pub error: NimbusError,
}

/// Outcome reported by a worker: one per archived part, or one per worker death
#[derive(Debug)]
pub struct WorkResult {
    pub worker_id: usize,
    /// Part archived or being archived; `None` when the worker died at Open
    pub conjoined_part: Option<u32>,
    pub size: u64,
    pub version_identifier: Option<String>,
    pub failure: Option<WorkFailure>,
}

impl WorkResult {
    fn archived(worker_id: usize, unit: &WorkUnit, version_identifier: String) -> Self {
        Self {
            worker_id,
            conjoined_part: Some(unit.conjoined_part),
            size: unit.size,
            version_identifier: Some(version_identifier),
            failure: None,
        }
    }

    fn failed(
        worker_id: usize,
        unit: Option<&WorkUnit>,
        action: WorkerAction,
        error: NimbusError,
    ) -> Self {
        Self {
            worker_id,
            conjoined_part: unit.map(|u| u.conjoined_part),
            size: unit.map(|u| u.size).unwrap_or(0),
            version_identifier: None,
            failure: Some(WorkFailure { action, error }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Name of the failed step, if any
    pub fn action(&self) -> Option<WorkerAction> {
        self.failure.as_ref().map(|f| f.action)
    }
}

/// One member of the worker pool
pub struct UploadWorker<R: ?Sized> {
    id: usize,
    file_path: PathBuf,
    requester: Arc<R>,
    work: WorkQueue,
    results: ResultSender,
}

impl<R> UploadWorker<R>
where
    R: Requester + ?Sized,
{
    pub fn new(
        id: usize,
        file_path: PathBuf,
        requester: Arc<R>,
        work: WorkQueue,
        results: ResultSender,
    ) -> Self {
        Self {
            id,
            file_path,
            requester,
            work,
            results,
        }
    }

    /// Run until the queue closes or a step fails.
    ///
    /// The file handle is dropped, and so closed, on every exit path.
    pub async fn run(self) {
        let mut file = match File::open(&self.file_path).await {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    worker = self.id,
                    path = %self.file_path.display(),
                    error = %err,
                    "worker failed to open source file"
                );
                self.report(WorkResult::failed(self.id, None, WorkerAction::Open, err.into()))
                    .await;
                return;
            }
        };

        debug!(worker = self.id, "worker started");

        while let Some(unit) = self.next_unit().await {
            if let Err(err) = file.seek(SeekFrom::Start(unit.offset)).await {
                self.fail(&unit, WorkerAction::Seek, err.into()).await;
                return;
            }

            let params = ConjoinedParams::new(unit.conjoined_identifier.clone(), unit.conjoined_part);
            let started = Instant::now();
            let archived = archive(
                self.requester.as_ref(),
                &unit.collection,
                &unit.key,
                Some(&params),
                (&mut file).take(unit.size),
                unit.size,
            )
            .await;
            standard::ARCHIVE_DURATION.observe(started.elapsed().as_secs_f64());

            match archived {
                Ok(version_identifier) => {
                    standard::PARTS_ARCHIVED.inc();
                    standard::BYTES_ARCHIVED.inc_by(unit.size);
                    debug!(
                        worker = self.id,
                        part = unit.conjoined_part,
                        size = unit.size,
                        "part archived"
                    );
                    if !self
                        .report(WorkResult::archived(self.id, &unit, version_identifier))
                        .await
                    {
                        return;
                    }
                }
                Err(err) => {
                    self.fail(&unit, WorkerAction::Archive, err).await;
                    return;
                }
            }
        }

        debug!(worker = self.id, "work queue closed, worker exiting");
    }

    async fn next_unit(&self) -> Option<WorkUnit> {
        self.work.lock().await.recv().await
    }

    async fn fail(&self, unit: &WorkUnit, action: WorkerAction, error: NimbusError) {
        standard::PART_FAILURES.inc();
        warn!(
            worker = self.id,
            part = unit.conjoined_part,
            action = action.as_str(),
            error = %error,
            "worker stopping after failure"
        );
        self.report(WorkResult::failed(self.id, Some(unit), action, error))
            .await;
    }

    /// Returns false once nobody is collecting results
    async fn report(&self, result: WorkResult) -> bool {
        if self.results.send(result).await.is_err() {
            debug!(worker = self.id, "result collector dropped, stopping");
            return false;
        }
        true
    }
}
