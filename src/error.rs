//! Error types for the watermark engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the watermark engine
///
/// None of these are fatal to a host: the engine logs them and degrades
/// (text fallback for images, skipped pass for rendering failures).
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Failed to load an image resource
    #[error("Failed to load resource: {0}")]
    LoadError(String),

    /// Resource was fetched but could not be decoded
    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    /// Failed to rasterize or encode a tile
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Operation referenced a node the document does not know about
    #[error("Document error: {0}")]
    DomError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::DecodeError(err.to_string())
    }
}
