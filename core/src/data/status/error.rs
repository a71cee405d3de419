//! Error type for the Status Record backend

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("status backend unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
