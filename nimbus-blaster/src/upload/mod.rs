//! Parallel conjoined upload pipeline
//!
//! partitioner -> work queue -> N workers -> result collector -> finish/abort

pub mod collector;
pub mod partition;
pub mod pool;
pub mod uploader;
pub mod worker;

pub use collector::{PartFailure, ResultCollector, UploadSummary};
pub use partition::{partition, WorkUnit};
pub use pool::{PoolChannels, WorkerPool};
pub use uploader::{ConjoinedUploader, UploadReport};
pub use worker::{UploadWorker, WorkFailure, WorkResult, WorkerAction};
