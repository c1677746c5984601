//! Error types for Hive scan resolution.

use thiserror::Error;

/// Errors from Hive scan resolution.
///
/// `Clone` so a failure captured while opening a table can be handed back
/// on every later use (see [`crate::HiveTable::startup`]).
#[derive(Debug, Clone, Error)]
pub enum HiveError {
    /// Configuration error (bad settings, unsupported prewhere method, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metastore unreachable or returned an error
    #[error("Metastore error: {0}")]
    Metastore(String),

    /// Metastore returned metadata this crate cannot interpret
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Table not found in the metastore
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Resolved partition count exceeds `max_partitions_to_read`
    #[error("Too many partitions to read. Current {count}, max {limit}")]
    TooManyPartitions { count: usize, limit: u64 },

    /// Declared input format has no directory listing strategy
    #[error("Unknown hive format {0}")]
    UnknownFormat(String),

    /// Directory listing failed for a partition; the whole resolution is aborted
    #[error("Listing partition '{partition}' failed: {message}")]
    Listing { partition: String, message: String },

    /// Storage/IO error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl HiveError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn metastore(msg: impl Into<String>) -> Self {
        Self::Metastore(msg.into())
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn unknown_format(format: impl Into<String>) -> Self {
        Self::UnknownFormat(format.into())
    }

    pub fn listing(partition: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Listing {
            partition: partition.into(),
            message: err.to_string(),
        }
    }

    /// True for failures to fetch or interpret metastore metadata.
    pub fn is_retrieval_failure(&self) -> bool {
        matches!(
            self,
            Self::Metastore(_) | Self::Metadata(_) | Self::TableNotFound(_)
        )
    }
}

/// Result type for Hive operations.
pub type Result<T> = std::result::Result<T, HiveError>;

impl From<std::io::Error> for HiveError {
    fn from(err: std::io::Error) -> Self {
        HiveError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for HiveError {
    fn from(err: serde_json::Error) -> Self {
        HiveError::Config(format!("Invalid JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_partitions_message() {
        let err = HiveError::TooManyPartitions {
            count: 150,
            limit: 100,
        };
        assert_eq!(
            err.to_string(),
            "Too many partitions to read. Current 150, max 100"
        );
        assert!(!err.is_retrieval_failure());
    }

    #[test]
    fn test_retrieval_failure_kinds() {
        assert!(HiveError::metastore("connection refused").is_retrieval_failure());
        assert!(HiveError::metadata("bad partition").is_retrieval_failure());
        assert!(!HiveError::unknown_format("x").is_retrieval_failure());
        assert!(!HiveError::listing("dt=1", "boom").is_retrieval_failure());
    }
}
