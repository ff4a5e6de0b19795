use std::path::PathBuf;

use thiserror::Error;

/// Library error type for wrap-studio operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The generation API credential is absent from the environment.
    #[error("missing API credential: environment variable {0} is not set")]
    CredentialMissing(String),

    /// The service returned no usable image for a pattern request.
    #[error("pattern generation failed: {0}")]
    PatternGeneration(String),

    /// The service returned no usable image for a subject request.
    #[error("subject processing failed: {0}")]
    SubjectProcessing(String),

    /// An image reference could not be decoded into pixels.
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// The configured inbox directory is invalid or unreadable.
    #[error("invalid photo inbox: {0}")]
    BadInbox(PathBuf),

    /// The present target cannot be written; renders degrade to no-ops.
    #[error("preview surface unavailable: {0}")]
    SurfaceUnavailable(PathBuf),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),

    /// HTTP transport error from the generation service.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
