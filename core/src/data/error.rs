//! Unified error type for the data layer
//!
//! Wraps the three adapter-specific error types (stream substrate, status
//! record, relational store) while preserving which backend produced the
//! failure, following the same backend-tag convention used per-adapter.

use thiserror::Error;

use super::status::StatusError;
use super::store::StoreError;
use super::stream::StreamError;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("stream substrate error: {0}")]
    Stream(#[from] StreamError),

    #[error("status record error: {0}")]
    Status(#[from] StatusError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DataError {
    /// Whether this failure is system-level per the Error Taxonomy (§7):
    /// the substrate being unreachable halts the Consumer Loop rather than
    /// being retried message-by-message.
    pub fn is_stop_consumer(&self) -> bool {
        match self {
            Self::Stream(e) => e.is_substrate_unavailable(),
            _ => false,
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Self::Stream(_) => "stream",
            Self::Status(_) => "status",
            Self::Store(_) => "store",
            Self::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_substrate_unavailable_is_stop_consumer() {
        let err = DataError::Stream(StreamError::SubstrateUnavailable("down".to_string()));
        assert!(err.is_stop_consumer());
    }

    #[test]
    fn status_error_is_not_stop_consumer() {
        let err = DataError::Status(StatusError::Unavailable("down".to_string()));
        assert!(!err.is_stop_consumer());
    }

    #[test]
    fn backend_tag_matches_variant() {
        assert_eq!(
            DataError::Store(StoreError::Unavailable("x".to_string())).backend(),
            "store"
        );
    }
}
