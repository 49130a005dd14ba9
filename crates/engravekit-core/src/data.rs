//! Data models for paths, scaling, session state, and delivery reporting
//!
//! This module provides:
//! - 2-D points in pixel space
//! - Traced paths (closed boundary loops and horizontal raster runs)
//! - Pixel-to-physical scale factors
//! - Device session lifecycle states
//! - The delivery report returned to callers after streaming

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, ImageError, Result};

/// A 2-D point in pixel space
///
/// Extractors produce pixel coordinates; all physical-unit conversion
/// happens in the toolpath compiler via [`ScaleFactor`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Column coordinate
    pub x: f64,
    /// Row coordinate
    pub y: f64,
}

impl Point {
    /// Create a point from pixel coordinates
    pub fn new(x: f64, y: f64) -> Self {
        debug_assert!(
            x.is_finite() && y.is_finite(),
            "Point coordinates must be finite: x={x}, y={y}"
        );
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx.hypot(dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Kind of a traced path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathKind {
    /// A closed polygon boundary; the path implicitly returns to its
    /// first vertex
    ClosedLoop,
    /// A single horizontal on-segment with exactly two endpoints,
    /// ordered in the scan direction of its row
    Run,
}

/// An ordered sequence of pixel-space points with a path kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedPath {
    /// Whether this path is a boundary loop or a raster run
    pub kind: PathKind,
    /// The path vertices, in traversal order
    pub points: Vec<Point>,
}

impl TracedPath {
    /// Create a closed boundary loop
    pub fn closed_loop(points: Vec<Point>) -> Self {
        Self {
            kind: PathKind::ClosedLoop,
            points,
        }
    }

    /// Create a horizontal raster run from its two endpoints
    pub fn run(start: Point, end: Point) -> Self {
        Self {
            kind: PathKind::Run,
            points: vec![start, end],
        }
    }

    /// Number of vertices
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the path has no vertices
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Scale from pixel space to physical units
///
/// Derived once per conversion as `target_size / max(width, height)`,
/// guaranteed positive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    /// Derive the scale factor for fitting a mask into a target
    /// physical size.
    ///
    /// # Errors
    /// Fails if the mask has zero area or the target size is not a
    /// positive finite number.
    pub fn fit(target_size: f64, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ImageError::EmptyImage { width, height }.into());
        }
        if !(target_size.is_finite() && target_size > 0.0) {
            return Err(Error::other(format!(
                "target size must be positive, got {target_size}"
            )));
        }
        Ok(Self(target_size / f64::from(width.max(height))))
    }

    /// The scalar value (physical units per pixel)
    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Device session lifecycle state
///
/// `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No connection attempt has been made
    Disconnected,
    /// Dialing the endpoint
    Connecting,
    /// Connected, not yet streaming
    Connected,
    /// Streaming a program, one command in flight at a time
    Streaming,
    /// Streaming finished and the connection was released
    Closed,
    /// The connection failed while dialing or mid-stream
    Failed,
}

impl SessionState {
    /// Whether the session can make no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Streaming => "streaming",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Aggregate outcome of streaming one program to the controller
///
/// Created once per session and immutable afterwards. The orchestrator
/// returns one of these for every conversion, including failures — a
/// failed conversion is a report with `overall_success = false`, never
/// a propagated error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Total commands the session attempted to deliver
    pub commands_sent: usize,
    /// Commands counted as acknowledged under the session's policy
    pub commands_acknowledged: usize,
    /// `commands_acknowledged / commands_sent` (1.0 when nothing was sent)
    pub success_ratio: f64,
    /// Whether the ratio cleared the configured success threshold
    pub overall_success: bool,
    /// Human-readable outcome summary
    pub message: String,
    /// When the session closed (or the conversion failed)
    pub completed_at: DateTime<Utc>,
}

impl DeliveryReport {
    /// Build a report from session counters after a complete stream.
    ///
    /// An empty program counts as fully delivered.
    pub fn from_counters(sent: usize, acknowledged: usize, threshold: f64) -> Self {
        let ratio = if sent == 0 {
            1.0
        } else {
            acknowledged as f64 / sent as f64
        };
        Self {
            commands_sent: sent,
            commands_acknowledged: acknowledged,
            success_ratio: ratio,
            overall_success: ratio > threshold,
            message: format!(
                "Completed: {}/{} commands ({:.1}%)",
                acknowledged,
                sent,
                ratio * 100.0
            ),
            completed_at: Utc::now(),
        }
    }

    /// Build a failure report for a conversion that never opened a
    /// device session (image, extraction, or dial errors).
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            commands_sent: 0,
            commands_acknowledged: 0,
            success_ratio: 0.0,
            overall_success: false,
            message: message.into(),
            completed_at: Utc::now(),
        }
    }

    /// Build a report for a session aborted mid-stream, carrying the
    /// counters accumulated before the connection was lost.
    pub fn aborted(sent: usize, acknowledged: usize, message: impl Into<String>) -> Self {
        let ratio = if sent == 0 {
            0.0
        } else {
            acknowledged as f64 / sent as f64
        };
        Self {
            commands_sent: sent,
            commands_acknowledged: acknowledged,
            success_ratio: ratio,
            overall_success: false,
            message: message.into(),
            completed_at: Utc::now(),
        }
    }
}
