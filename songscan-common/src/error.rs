//! Common error types for SongScan

use thiserror::Error;

/// Common result type for SongScan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the service and the client
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
