//! # EngraveKit CAM Tools
//!
//! This crate turns a grayscale bitmap into a toolpath program for a
//! laser-engraving controller.
//!
//! ## Pipeline stages
//!
//! - **Binarizer**: threshold a grayscale bitmap into an engrave/skip mask
//! - **Vector tracing**: outer boundary loops with area filtering and
//!   polygon simplification
//! - **Raster scanning**: zig-zag horizontal runs, plus a minimal
//!   single-direction fallback scanner
//! - **Toolpath compiler**: ordered command program with laser/motion
//!   ordering guarantees
//!
//! All stages are pure and allocation-only; independent conversions can
//! run fully in parallel.

pub mod binarize;
pub mod error;
pub mod raster_scan;
pub mod toolpath;
pub mod vector_trace;

pub use binarize::{BinaryMask, Binarizer, DEFAULT_THRESHOLD};
pub use error::{CamToolError, CamToolResult};
pub use raster_scan::{extract_runs, extract_runs_simple};
pub use toolpath::{compile, validate_program, Command, CompilerParams, ToolpathProgram};
pub use vector_trace::{extract_loops, VectorTraceParams};
