//! Custom error types for pharmascan.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, PharmascanError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for pharmascan operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum PharmascanError {
    /// PubMed rejected the search query itself
    #[error("query rejected by PubMed: {0}")]
    QueryRejected(String),

    /// A batch of records could not be retrieved after retry exhaustion.
    /// Carries exactly the PMIDs that were lost.
    #[error("failed to fetch batch {}..{} ({} PMIDs): {}", .first, .last, .pmids.len(), .message)]
    FetchFailure {
        /// First PMID of the failed batch
        first: String,
        /// Last PMID of the failed batch
        last: String,
        /// All PMIDs in the failed batch
        pmids: Vec<String>,
        /// What went wrong on the final attempt
        message: String,
    },

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// External API returned an error status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code from the API
        code: i32,
        /// Error message from the API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl PharmascanError {
    /// Build a `FetchFailure` from the PMIDs of the lost batch.
    pub fn fetch_failure(pmids: &[String], message: impl Into<String>) -> Self {
        Self::FetchFailure {
            first: pmids.first().cloned().unwrap_or_default(),
            last: pmids.last().cloned().unwrap_or_default(),
            pmids: pmids.to_vec(),
            message: message.into(),
        }
    }
}

/// Result type alias using `PharmascanError`
pub type Result<T> = std::result::Result<T, PharmascanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_carries_batch_range() {
        let pmids = vec!["100".to_string(), "101".to_string(), "102".to_string()];
        let err = PharmascanError::fetch_failure(&pmids, "connection reset");

        let msg = err.to_string();
        assert!(msg.contains("100..102"));
        assert!(msg.contains("3 PMIDs"));
        assert!(msg.contains("connection reset"));

        match err {
            PharmascanError::FetchFailure { pmids: lost, .. } => {
                assert_eq!(lost, pmids);
            }
            other => panic!("unexpected error kind: {other}"),
        }
    }
}
