//! Error types for the lightmap baker.

use thiserror::Error;

/// Main error type for baking operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad caller input (zero sized image, missing arrays, bad indices)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Scene could not be built into anything traceable
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    /// Mesh surface index out of range of its vertex arrays
    #[error("Mesh {mesh}: index {index} out of bounds (vertex count: {count})")]
    IndexOutOfBounds { mesh: usize, index: u32, count: usize },

    /// The progress callback asked for the bake to stop
    #[error("Bake cancelled")]
    Cancelled,

    /// Texel cache file has the wrong magic, version or size
    #[error("Invalid texel cache: {0}")]
    InvalidCache(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decode / encode error
    #[cfg(feature = "io")]
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True when the error came from the progress callback.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for baking operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::invalid("zero sized image");
        assert!(e.to_string().contains("zero sized"));

        let e = Error::IndexOutOfBounds { mesh: 2, index: 9, count: 3 };
        assert!(e.to_string().contains("9"));
        assert!(e.to_string().contains("3"));

        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::other("x").is_cancelled());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
