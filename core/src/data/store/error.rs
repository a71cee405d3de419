//! Error type for the relational store adapter

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store database error: {0}")]
    Database(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
