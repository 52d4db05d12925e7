//! Error types for the AMP converter

use thiserror::Error;

/// Result type alias for converter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering, validating or converting a page
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to initialize a renderer or validator
    #[error("Initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load a URL
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// Failed to produce the rendered DOM
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// The validator could not run or returned something unreadable
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// The page URL is not an absolute http(s) URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Reading or writing one of the working files failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = Error::io(
            "inline.css",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        let msg = err.to_string();
        assert!(msg.contains("inline.css"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn invalid_url_message() {
        let err = Error::InvalidUrl {
            url: "ftp://x".into(),
            reason: "unsupported scheme".into(),
        };
        assert_eq!(err.to_string(), "Invalid URL 'ftp://x': unsupported scheme");
    }
}
