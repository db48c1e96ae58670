//! Fixed-size pool of upload workers
//!
//! Workers share one bounded work queue and one result channel. The pool never
//! closes the queue itself; the dispatcher does so by dropping the sender.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::worker::{ResultReceiver, UploadWorker, WorkQueue, WorkSender};
use crate::config::UploadConfig;
use crate::metrics::standard;
use crate::storage::Requester;

/// Handles of running workers
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

/// Channels connecting a launched pool to its dispatcher and collector
pub struct PoolChannels {
    /// Feed work units here; drop to close the queue
    pub work: WorkSender,
    /// Closes once every worker has exited
    pub results: ResultReceiver,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers reading from `file_path`
    pub fn launch<R>(
        file_path: PathBuf,
        requester: Arc<R>,
        config: &UploadConfig,
    ) -> (Self, PoolChannels)
    where
        R: Requester + ?Sized + 'static,
    {
        let worker_count = config.worker_count.max(1);
        let (work_tx, work_rx) = mpsc::channel(config.queue_depth.max(1));
        let (results_tx, results_rx) = mpsc::channel(worker_count * 2);
        let queue: WorkQueue = Arc::new(Mutex::new(work_rx));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let worker = UploadWorker::new(
                worker_id,
                file_path.clone(),
                requester.clone(),
                queue.clone(),
                results_tx.clone(),
            );

            workers.push(tokio::spawn(async move {
                standard::ACTIVE_WORKERS.inc();
                worker.run().await;
                standard::ACTIVE_WORKERS.dec();
            }));
        }

        // Only workers hold result senders, so the channel closes when the last one exits.
        drop(results_tx);

        debug!(workers = worker_count, path = %file_path.display(), "worker pool launched");

        (
            Self { workers },
            PoolChannels {
                work: work_tx,
                results: results_rx,
            },
        )
    }

    /// Number of workers launched
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit. Panicked workers are logged and counted.
    pub async fn join(self) -> usize {
        let mut panicked = 0;
        for (worker_id, handle) in self.workers.into_iter().enumerate() {
            if let Err(err) = handle.await {
                panicked += 1;
                error!(worker = worker_id, error = %err, "upload worker task failed");
            }
        }
        panicked
    }
}
