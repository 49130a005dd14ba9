//! Error types for the CAM tools crate.
//!
//! This module provides structured error types for binarization, path
//! extraction, and toolpath compilation.

use std::io;
use thiserror::Error;

/// Errors that can occur during CAM tool operations.
#[derive(Error, Debug)]
pub enum CamToolError {
    /// Invalid parameters were provided to a CAM tool.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The bitmap could not be loaded or decoded.
    #[error("Failed to load image: {0}")]
    LoadError(String),

    /// Image processing failed.
    #[error("Image processing error: {0}")]
    ImageError(String),

    /// A geometry operation failed during path extraction.
    #[error("Geometry error: {0}")]
    GeometryError(String),

    /// Toolpath generation produced an invalid program.
    #[error("Toolpath generation failed: {0}")]
    GenerationFailed(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

/// Result type alias for CAM tool operations.
pub type CamToolResult<T> = Result<T, CamToolError>;
