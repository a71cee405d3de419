//! Error type for the durable stream substrate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream substrate unavailable: {0}")]
    SubstrateUnavailable(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("consumer group {group} does not exist on stream {stream}")]
    NoGroup { stream: String, group: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StreamError {
    /// Whether this failure should be treated as a stop-consumer condition
    /// per the Error Taxonomy (`SubstrateUnavailable` is system-level).
    pub fn is_substrate_unavailable(&self) -> bool {
        matches!(self, Self::SubstrateUnavailable(_) | Self::Connection(_))
    }
}
