//! Error types for the load-generation engine
//!
//! Failures fall into three classes with different propagation rules:
//! configuration errors are returned synchronously before any worker thread
//! starts (or before the offending request is sent), internal invariant
//! violations indicate a sizing defect rather than a usage error, and worker
//! runtime errors are isolated to the failing worker and surfaced in
//! aggregate by the health check.

use thiserror::Error;

/// Error type for all load-generation operations
#[derive(Debug, Error)]
pub enum CargadorError {
    /// User input or model mismatch: bad shape, missing data for an
    /// unresolved wildcard dimension, batch size incompatible with the model,
    /// or explicit data of the wrong size
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the mismatch
        reason: String,
    },

    /// A shared synthetic buffer was smaller than a requirement it was sized
    /// to cover; signals a defect in the sizing pass, never user-fixable
    #[error("internal invariant violated: {reason}")]
    InternalInvariant {
        /// Description of the violated invariant
        reason: String,
    },

    /// Failed to read per-input data from the data directory
    #[error("failed to read input data from '{path}': {source}")]
    Io {
        /// Path of the file that could not be read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An inference request failed at the client boundary
    #[error("inference request failed: {0}")]
    Request(String),

    /// Aggregate health verdict: one or more workers stopped issuing requests
    #[error("failed to maintain requested load: {failed} worker thread(s) reported errors")]
    UnhealthyPool {
        /// Number of workers whose status is non-ok
        failed: usize,
    },
}

/// Result type alias for load-generation operations
pub type Result<T> = std::result::Result<T, CargadorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_display() {
        let err = CargadorError::InvalidConfiguration {
            reason: "batch size 4 exceeds maximum 2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration: batch size 4 exceeds maximum 2"
        );
    }

    #[test]
    fn test_internal_invariant_display() {
        let err = CargadorError::InternalInvariant {
            reason: "buffer too small".to_string(),
        };
        assert!(err.to_string().starts_with("internal invariant violated"));
    }

    #[test]
    fn test_io_error_carries_path() {
        let err = CargadorError::Io {
            path: "/data/input0".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/data/input0"));
    }

    #[test]
    fn test_unhealthy_pool_display() {
        let err = CargadorError::UnhealthyPool { failed: 2 };
        assert!(err.to_string().contains("2 worker thread(s)"));
    }
}
