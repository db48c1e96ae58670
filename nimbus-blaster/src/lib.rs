//! nimbus-blaster - parallel conjoined uploads to nimbus.io-style storage
//!
//! This crate provides:
//! - A protocol client for conjoined (multi-part) sessions and object data
//! - A fixed-size worker pool streaming file slices as conjoined parts
//! - Result collection that finishes or aborts each session exactly once

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod storage;
pub mod upload;

pub use config::{BlasterConfig, HttpConfig, UploadConfig};
pub use error::{NimbusError, Result};
pub use storage::{ConjoinedParams, ConjoinedSession, HttpRequester, Requester, RetrieveParams};
pub use upload::{ConjoinedUploader, UploadReport, WorkResult, WorkUnit, WorkerAction};
