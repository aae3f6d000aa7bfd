//! Error types for the remote CASC pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Transport
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Content not found on CDN: {hash}")]
    ContentNotFound { hash: String },

    // Data formats
    #[error("Parse error: {0}")]
    Parse(#[from] casc_formats::Error),

    #[error("BPSV parse error: {0}")]
    Bpsv(#[from] casc_bpsv::Error),

    #[error("Invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    // Pipeline state
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Build inconsistency: {reason}")]
    BuildInconsistency { reason: String },

    /// The requested file data ID has no root entry. Expected during
    /// normal operation; not an internal failure.
    #[error("No root entry for file data ID {0}")]
    NotFound(u32),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Cache error: {0}")]
    Cache(#[from] casc_cache::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a build inconsistency error
    pub fn build_inconsistency(reason: impl Into<String>) -> Self {
        Self::BuildInconsistency {
            reason: reason.into(),
        }
    }

    /// Create an invalid manifest error
    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }

    /// Create a content not found error
    pub fn content_not_found(hash: impl Into<String>) -> Self {
        Self::ContentNotFound { hash: hash.into() }
    }

    /// `true` for the benign "no such file data ID" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
