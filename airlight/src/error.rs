//! Error types for airlight estimation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for airlight operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while estimating airlight.
///
/// Every error is local to one pipeline stage and deterministic: retrying
/// with the same inputs fails the same way.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {parameter}: {reason}")]
    InvalidConfig {
        parameter: &'static str,
        reason: String,
    },

    #[error("Stage '{stage}' produced no results")]
    EmptyResult { stage: &'static str },

    #[error(
        "Dimension mismatch at scale {scale_index} ({what}): expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        scale_index: usize,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Pixel buffer for a {width}x{height} RGB image needs {expected} values, got {actual}"
    )]
    PixelBufferSize {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("No airlight estimate: {reason}")]
    NoEstimate { reason: &'static str },

    #[error("Failed to load image '{path}': {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to load config '{path}': {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("Cache I/O failed for '{path}': {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn invalid_config(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            parameter,
            reason: reason.into(),
        }
    }

    /// Whether the caller may fall back (e.g. to another scale configuration)
    /// instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NoEstimate { .. } | Error::EmptyResult { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message() {
        let err = Error::invalid_config("patch_size", "must be positive, got 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: patch_size: must be positive, got 0"
        );
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = Error::DimensionMismatch {
            scale_index: 2,
            what: "std grid",
            expected: 120,
            actual: 484,
        };
        let msg = err.to_string();
        assert!(msg.contains("scale 2"));
        assert!(msg.contains("120"));
        assert!(msg.contains("484"));
    }

    #[test]
    fn test_pixel_buffer_size_message() {
        let err = Error::PixelBufferSize {
            width: 4,
            height: 3,
            expected: 36,
            actual: 35,
        };
        let msg = err.to_string();
        assert!(msg.contains("4x3"));
        assert!(msg.contains("36"));
        assert!(!msg.contains("scale"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_no_estimate_is_recoverable() {
        assert!(Error::NoEstimate { reason: "empty" }.is_recoverable());
        assert!(Error::EmptyResult { stage: "filter" }.is_recoverable());
    }

    #[test]
    fn test_cache_error_source_chain() {
        use std::error::Error as StdError;

        let err = Error::Cache {
            path: PathBuf::from("/tmp/cache/abc.json"),
            source: io::Error::other("disk full"),
        };
        assert!(err.to_string().contains("/tmp/cache/abc.json"));
        assert!(err.source().is_some());
    }
}
