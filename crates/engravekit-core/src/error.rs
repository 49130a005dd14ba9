//! Error handling for EngraveKit
//!
//! Provides error types for all layers of the pipeline:
//! - Image errors (loading/decoding bitmaps)
//! - Extraction errors (path tracing strategies)
//! - Connection errors (device communication)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Image error type
///
/// Represents errors raised while loading or preparing the input bitmap.
/// These are fatal: no toolpath is generated and no device session is
/// opened when one occurs.
#[derive(Error, Debug, Clone)]
pub enum ImageError {
    /// The bitmap file could not be read or decoded
    #[error("Failed to load image {path}: {reason}")]
    LoadFailed {
        /// Path of the image that failed to load.
        path: String,
        /// The reason the load failed.
        reason: String,
    },

    /// The bitmap has no pixels to work with
    #[error("Image has zero area ({width}x{height})")]
    EmptyImage {
        /// Width of the offending image in pixels.
        width: u32,
        /// Height of the offending image in pixels.
        height: u32,
    },

    /// Generic image error
    #[error("Image error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Extraction error type
///
/// Represents failures of path-extraction strategies. A single strategy
/// failing is recoverable (the orchestrator advances to the next one);
/// only `AllStrategiesFailed` is terminal.
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    /// One extraction strategy raised unexpectedly
    #[error("Extraction strategy '{strategy}' failed: {reason}")]
    StrategyFailed {
        /// Name of the strategy that failed.
        strategy: String,
        /// The reason the strategy failed.
        reason: String,
    },

    /// Every strategy in the priority order failed
    #[error("All extraction strategies failed; last error: {last_error}")]
    AllStrategiesFailed {
        /// The error reported by the last strategy attempted.
        last_error: String,
    },
}

/// Connection error type
///
/// Represents errors on the link to the engraving controller. Dial
/// failures and lost connections are fatal to the current session;
/// per-command I/O hiccups are not (the session skips the command).
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// The endpoint could not be dialed
    #[error("Failed to connect to {endpoint}: {reason}")]
    FailedToConnect {
        /// The endpoint address (host:port).
        endpoint: String,
        /// The reason the dial failed.
        reason: String,
    },

    /// The dial did not complete within the connect timeout
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// The connection dropped mid-session
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// A non-fatal I/O error on a single command
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Main error type for EngraveKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Image error
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Extraction error
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connect timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::ConnectTimeout { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this error means the device link is gone.
    ///
    /// Session-fatal: streaming cannot continue past one of these,
    /// unlike a per-command `IoError`.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::ConnectionLost { .. })
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
