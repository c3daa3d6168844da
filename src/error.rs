//! Domain error type for the search orchestration layer
//!
//! Configuration errors are detected before any device resource is acquired;
//! device errors wrap the accelerator runtime's diagnostic and are fatal to
//! the search instance that raised them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Configuration error from anything displayable
    pub fn config(msg: impl std::fmt::Display) -> Self {
        SearchError::Configuration(msg.to_string())
    }

    /// Device error carrying the underlying diagnostic text
    pub fn device(msg: impl std::fmt::Display) -> Self {
        SearchError::Device(msg.to_string())
    }
}
