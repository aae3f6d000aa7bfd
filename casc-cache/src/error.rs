//! Error types for build cache operations

use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine a user data directory")]
    DataDirectoryNotFound,
}
