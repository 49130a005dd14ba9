//! # EngraveKit Core
//!
//! Core types and utilities for EngraveKit.
//! Provides the shared data models (paths, scaling, session state,
//! delivery reports) and the unified error taxonomy used by the
//! CAM and communication layers.

pub mod data;
pub mod error;

pub use data::{DeliveryReport, PathKind, Point, ScaleFactor, SessionState, TracedPath};
pub use error::{ConnectionError, Error, ExtractionError, ImageError, Result};
