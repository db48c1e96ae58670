//! Error types for nimbus-blaster
//!
//! One taxonomy covers transport, protocol, envelope decoding, application-level
//! rejections, unsupported options and upload aggregation.

use thiserror::Error;

/// Primary error type for all storage and upload operations
#[derive(Debug, Error)]
pub enum NimbusError {
    // ========== Transport Errors ==========

    /// The requester could not complete the exchange
    #[error("request to {host} failed: {reason}")]
    Transport { host: String, reason: String },

    /// Local I/O failure (open, seek, read of the source file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request body produced fewer bytes than it declared
    #[error("request body ended early: declared {expected} bytes, streamed {actual}")]
    BodyLengthMismatch { expected: u64, actual: u64 },

    // ========== Protocol Errors ==========

    /// The service answered with a status the operation does not accept
    #[error("{method} {host} {path} failed ({status}) {body}")]
    UnexpectedStatus {
        method: String,
        host: String,
        path: String,
        status: u16,
        body: String,
    },

    /// The success envelope was not valid JSON of the expected shape
    #[error("failed to decode response envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// The envelope decoded but reported `success: false`
    #[error("{operation} returned success=false")]
    Rejected { operation: String },

    /// A recognised option that this client refuses to send
    #[error("not implemented: {feature}")]
    NotImplemented { feature: &'static str },

    // ========== Upload Errors ==========

    /// At least one part of a conjoined upload did not archive
    #[error("conjoined upload of {key} failed: {failed} of {expected} parts did not archive")]
    UploadFailed {
        key: String,
        failed: usize,
        expected: usize,
    },

    // ========== Runtime Errors ==========

    /// Configuration rejected by validation
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl NimbusError {
    /// Returns true if the failure happened below the protocol layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NimbusError::Transport { .. }
                | NimbusError::Io(_)
                | NimbusError::BodyLengthMismatch { .. }
        )
    }

    /// Returns true if the service answered but the answer was unacceptable
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            NimbusError::UnexpectedStatus { .. }
                | NimbusError::Decode(_)
                | NimbusError::Rejected { .. }
        )
    }

    /// HTTP status carried by a protocol error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            NimbusError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for nimbus-blaster operations
pub type Result<T> = std::result::Result<T, NimbusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_status_display() {
        let err = NimbusError::UnexpectedStatus {
            method: "POST".into(),
            host: "photos.nimbus.io".into(),
            path: "/conjoined/a?action=start".into(),
            status: 503,
            body: "busy".into(),
        };

        assert_eq!(
            err.to_string(),
            "POST photos.nimbus.io /conjoined/a?action=start failed (503) busy"
        );
        assert!(err.is_protocol());
        assert!(!err.is_transport());
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_rejected_is_distinct_from_transport() {
        let err = NimbusError::Rejected {
            operation: "conjoined action=finish".into(),
        };
        assert!(err.is_protocol());
        assert!(!err.is_transport());
        assert_eq!(err.status(), None);
    }
}
