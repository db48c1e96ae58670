//! Configuration for the requester and the upload pipeline
//!
//! Values come from defaults, then an optional JSON file, then environment
//! variables, then command-line flags.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NimbusError, Result};

/// Default slice size for conjoined parts (10MB)
pub const DEFAULT_SLICE_SIZE: u64 = 10 * 1024 * 1024;

/// Default service domain collections are resolved under
pub const DEFAULT_SERVICE_DOMAIN: &str = "nimbus.io";

/// Transport configuration for [`crate::storage::HttpRequester`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Collections resolve to `{collection}.{service_domain}`
    pub service_domain: String,
    /// `http` or `https`
    pub scheme: String,
    /// Explicit port, if not the scheme default
    pub port: Option<u16>,
    /// Account name
    pub username: Option<String>,
    /// Secret paired with `username`
    pub auth_key: Option<String>,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            service_domain: DEFAULT_SERVICE_DOMAIN.into(),
            scheme: "https".into(),
            port: None,
            username: None,
            auth_key: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
        }
    }
}

impl HttpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.service_domain.is_empty() {
            return Err(invalid("service_domain must not be empty"));
        }
        if self.scheme != "http" && self.scheme != "https" {
            return Err(invalid(format!(
                "scheme must be http or https, got {}",
                self.scheme
            )));
        }
        if self.auth_key.is_some() && self.username.is_none() {
            return Err(invalid("auth_key is set but username is not"));
        }
        Ok(())
    }
}

/// Sizing for the upload pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Number of concurrent workers, each holding one file handle
    pub worker_count: usize,
    /// Bytes per conjoined part
    pub slice_size: u64,
    /// Work units buffered between the dispatcher and the workers
    pub queue_depth: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let worker_count = num_cpus::get().clamp(2, 8);
        Self {
            worker_count,
            slice_size: DEFAULT_SLICE_SIZE,
            queue_depth: worker_count * 2,
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(invalid("worker_count must be at least 1"));
        }
        if self.slice_size == 0 {
            return Err(invalid("slice_size must be at least 1 byte"));
        }
        if self.queue_depth == 0 {
            return Err(invalid("queue_depth must be at least 1"));
        }
        Ok(())
    }
}

/// Full configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlasterConfig {
    pub http: HttpConfig,
    pub upload: UploadConfig,
}

impl BlasterConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            invalid(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| invalid(format!("malformed config: {}", e)))
    }

    /// Overlay `NIMBUS_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(domain) = lookup("NIMBUS_SERVICE_DOMAIN") {
            self.http.service_domain = domain;
        }
        if let Some(username) = lookup("NIMBUS_USERNAME") {
            self.http.username = Some(username);
        }
        if let Some(auth_key) = lookup("NIMBUS_AUTH_KEY") {
            self.http.auth_key = Some(auth_key);
        }
        if let Some(workers) = lookup("NIMBUS_WORKERS") {
            self.upload.worker_count = workers
                .parse()
                .map_err(|_| invalid(format!("NIMBUS_WORKERS is not a number: {}", workers)))?;
        }
        if let Some(slice) = lookup("NIMBUS_SLICE_SIZE") {
            self.upload.slice_size = slice
                .parse()
                .map_err(|_| invalid(format!("NIMBUS_SLICE_SIZE is not a number: {}", slice)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.http.validate()?;
        self.upload.validate()
    }
}

fn invalid(reason: impl Into<String>) -> NimbusError {
    NimbusError::InvalidConfig {
        reason: reason.into(),
    }
}
