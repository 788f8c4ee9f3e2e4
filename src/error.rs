//! Unified error handling for the postcode-tracker library.
//!
//! This module provides a consistent error type for all pipeline operations.
//! Per-file decode failures are isolated by the batch pipeline (logged and
//! skipped), while store and catalog failures abort the current operation
//! and must be surfaced distinctly.

use std::fmt;

/// Unified error type for postcode-tracker operations.
#[derive(Debug, Clone)]
pub enum TrackerError {
    /// Malformed or unreadable activity trace container
    Decode {
        activity_id: String,
        message: String,
    },
    /// Point store unreadable or unwritable
    Storage { message: String },
    /// Postcode catalog unreadable, corrupt, or in an unsupported format
    Format { message: String },
    /// Decoded point carries coordinates outside valid geodetic ranges
    InvalidCoordinates {
        activity_id: String,
        message: String,
    },
    /// Generic internal error
    Internal { message: String },
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Decode {
                activity_id,
                message,
            } => {
                write!(f, "Failed to decode trace '{}': {}", activity_id, message)
            }
            TrackerError::Storage { message } => {
                write!(f, "Point store error: {}", message)
            }
            TrackerError::Format { message } => {
                write!(f, "Postcode catalog error: {}", message)
            }
            TrackerError::InvalidCoordinates {
                activity_id,
                message,
            } => {
                write!(
                    f,
                    "Trace '{}' has invalid coordinates: {}",
                    activity_id, message
                )
            }
            TrackerError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for TrackerError {}

/// Result type alias for postcode-tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackerError::Decode {
            activity_id: "12345678".to_string(),
            message: "truncated header".to_string(),
        };
        assert!(err.to_string().contains("12345678"));
        assert!(err.to_string().contains("truncated header"));
    }

    #[test]
    fn test_storage_and_format_are_distinct() {
        let storage = TrackerError::Storage {
            message: "disk full".to_string(),
        };
        let format = TrackerError::Format {
            message: "not a FeatureCollection".to_string(),
        };
        assert!(storage.to_string().starts_with("Point store"));
        assert!(format.to_string().starts_with("Postcode catalog"));
    }
}
