//! Conjoined upload of one file
//!
//! Start a session, slice the file into parts, archive them through the worker
//! pool, then finish the session if every part archived or abort it otherwise.
//! Exactly one of finish or abort is issued per started session.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::collector::{ResultCollector, UploadSummary};
use super::partition::{part_count, partition, WorkUnit};
use super::pool::WorkerPool;
use super::worker::WorkSender;
use crate::config::UploadConfig;
use crate::error::{NimbusError, Result};
use crate::metrics::standard;
use crate::storage::{ConjoinedSession, Requester};

/// Result of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub conjoined_identifier: String,
    pub parts: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl UploadReport {
    /// Throughput in MB/s
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (self.bytes as f64 / 1024.0 / 1024.0) / secs
    }
}

/// Drives conjoined uploads over a shared requester
pub struct ConjoinedUploader<R: ?Sized> {
    requester: Arc<R>,
    config: UploadConfig,
}

impl<R> ConjoinedUploader<R>
where
    R: Requester + ?Sized + 'static,
{
    /// Create an uploader. Fails if the config does not validate.
    pub fn new(requester: Arc<R>, config: UploadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { requester, config })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload `file_path` to `key` in `collection`
    pub async fn upload(
        &self,
        collection: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<UploadReport> {
        let started = Instant::now();

        // A file that cannot be stat'ed never opens a session.
        let file_size = tokio::fs::metadata(file_path).await?.len();

        // Rejects files that need more parts than a part index can hold.
        part_count(file_size, self.config.slice_size)?;

        let session = ConjoinedSession::start(self.requester.as_ref(), collection, key).await?;
        let units = match partition(&session, file_size, self.config.slice_size) {
            Ok(units) => units,
            Err(err) => {
                self.abort(session, key).await;
                return Err(err);
            }
        };

        info!(
            key,
            conjoined_identifier = session.conjoined_identifier(),
            parts = units.len(),
            bytes = file_size,
            workers = self.config.worker_count,
            "dispatching conjoined parts"
        );

        let summary = self.archive_parts(file_path, units).await;

        for death in &summary.worker_deaths {
            warn!(
                worker = death.worker_id,
                action = death.action.as_str(),
                error = %death.error,
                "worker exited before taking a part"
            );
        }

        if summary.is_success() {
            let conjoined_identifier = session.conjoined_identifier().to_string();
            session.finish(self.requester.as_ref()).await?;
            standard::SESSIONS_FINISHED.inc();

            let report = UploadReport {
                conjoined_identifier,
                parts: summary.archived.len(),
                bytes: summary.bytes_archived(),
                elapsed: started.elapsed(),
            };
            info!(
                key,
                parts = report.parts,
                bytes = report.bytes,
                mbps = report.throughput_mbps(),
                "conjoined upload complete"
            );
            return Ok(report);
        }

        for failure in &summary.failures {
            warn!(
                worker = failure.worker_id,
                part = ?failure.conjoined_part,
                action = failure.action.as_str(),
                error = %failure.error,
                "part failed"
            );
        }

        self.abort(session, key).await;

        Err(NimbusError::UploadFailed {
            key: key.to_string(),
            failed: summary.failed_count(),
            expected: summary.expected,
        })
    }

    /// Abort `session`; a failed abort is logged, the caller reports the original error
    async fn abort(&self, session: ConjoinedSession, key: &str) {
        if let Err(err) = session.abort(self.requester.as_ref()).await {
            error!(key, error = %err, "abort of failed conjoined upload also failed");
        }
        standard::SESSIONS_ABORTED.inc();
    }

    /// Run the pool over `units` and collect one summary
    async fn archive_parts(&self, file_path: &Path, units: Vec<WorkUnit>) -> UploadSummary {
        let collector = ResultCollector::new(units.iter().map(|u| u.conjoined_part));
        let (pool, mut channels) =
            WorkerPool::launch(file_path.to_path_buf(), self.requester.clone(), &self.config);
        debug!(workers = pool.size(), parts = units.len(), "dispatching to worker pool");

        let (_, summary) = tokio::join!(
            dispatch(channels.work, units),
            collector.drain(&mut channels.results)
        );

        let panicked = pool.join().await;
        if panicked > 0 {
            warn!(panicked, "upload workers panicked");
        }
        summary
    }
}

/// Feed units to the queue, then close it by dropping the sender
async fn dispatch(work: WorkSender, units: Vec<WorkUnit>) -> usize {
    let total = units.len();
    let mut sent = 0;
    for unit in units {
        if work.send(unit).await.is_err() {
            warn!(sent, total, "every worker has exited, stopping dispatch");
            break;
        }
        sent += 1;
    }
    sent
}
