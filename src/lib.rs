//! # EngraveKit
//!
//! Converts raster images to laser toolpath programs and streams them
//! to GRBL-style engraving controllers over TCP.
//!
//! ## Architecture
//!
//! EngraveKit is organized as a workspace with multiple crates:
//!
//! 1. **engravekit-core** - Shared types, error taxonomy, delivery reports
//! 2. **engravekit-camtools** - Binarization, path extraction, toolpath compilation
//! 3. **engravekit-communication** - TCP line transport, streaming sessions
//! 4. **engravekit** - Main binary and the conversion orchestrator
//!
//! ## Pipeline
//!
//! Bitmap -> binary mask -> paths (vector loops or raster runs) ->
//! command program -> device session -> delivery report. The
//! orchestrator never fails outright: every conversion produces a
//! [`DeliveryReport`], and failures surface as `overall_success = false`
//! with a descriptive message.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use engravekit_camtools::{
    compile, extract_loops, extract_runs, extract_runs_simple, Binarizer, BinaryMask,
    CamToolResult, CompilerParams, ToolpathProgram, VectorTraceParams, DEFAULT_THRESHOLD,
};
use engravekit_communication::DeviceSession;
use engravekit_core::{ExtractionError, ScaleFactor, TracedPath};

pub use engravekit_camtools as camtools;
pub use engravekit_communication as communication;

pub use engravekit_communication::{AckTimeoutPolicy, Endpoint, SessionConfig};
pub use engravekit_core::{DeliveryReport, Error, Result, SessionState};

/// Initialize logging for the application
///
/// Respects `RUST_LOG`; defaults to `info` when unset.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    Ok(())
}

/// Which engraving style to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngraveStyle {
    /// Trace region boundaries into closed loops
    Vector,
    /// Fill regions with zig-zag raster runs
    Raster,
}

/// Parameters for a full image-to-device conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionParams {
    /// Preferred extraction style
    pub style: EngraveStyle,
    /// Binarization threshold (samples below it are engraved)
    pub threshold: u8,
    /// Flip the engrave/skip classification
    pub invert: bool,
    /// Vector boundary tracing parameters
    pub trace: VectorTraceParams,
    /// Toolpath compilation parameters
    pub compiler: CompilerParams,
    /// Physical size of the engraved area's longest side
    pub target_size: f64,
    /// Streaming session configuration
    pub session: SessionConfig,
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self {
            style: EngraveStyle::Vector,
            threshold: DEFAULT_THRESHOLD,
            invert: false,
            trace: VectorTraceParams::default(),
            compiler: CompilerParams::default(),
            target_size: 20.0,
            session: SessionConfig::default(),
        }
    }
}

/// Drives a full conversion: binarize, extract, compile, stream.
///
/// Extraction strategies are evaluated in priority order with each
/// failure carried as data, never as control flow: the preferred style
/// runs first and the minimal fallback scanner covers for it if it
/// fails unexpectedly. The device session only opens after a program
/// exists, and conversions targeting the same [`Endpoint`] queue behind
/// each other.
pub struct ConversionOrchestrator {
    endpoint: Arc<Endpoint>,
    params: ConversionParams,
}

impl ConversionOrchestrator {
    /// Create an orchestrator for the given endpoint and parameters
    pub fn new(endpoint: Arc<Endpoint>, params: ConversionParams) -> Self {
        Self { endpoint, params }
    }

    /// Convert a bitmap file and stream it to the controller.
    ///
    /// An unreadable or undecodable file aborts before extraction; no
    /// device session is opened.
    pub async fn convert_file<P: AsRef<Path>>(&self, path: P) -> DeliveryReport {
        let mask = match self.binarizer().binarize_file(path.as_ref()) {
            Ok(mask) => mask,
            Err(e) => {
                tracing::error!(error = %e, "image load failed, aborting conversion");
                return DeliveryReport::failure(format!("Image load failed: {e}"));
            }
        };
        self.convert_mask(&mask).await
    }

    /// Convert an in-memory grayscale bitmap and stream it to the
    /// controller
    pub async fn convert_image(&self, image: &GrayImage) -> DeliveryReport {
        let mask = match self.binarizer().binarize(image) {
            Ok(mask) => mask,
            Err(e) => {
                tracing::error!(error = %e, "binarization failed, aborting conversion");
                return DeliveryReport::failure(format!("Image load failed: {e}"));
            }
        };
        self.convert_mask(&mask).await
    }

    async fn convert_mask(&self, mask: &BinaryMask) -> DeliveryReport {
        let paths = match self.extract_paths(mask) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!(error = %e, "extraction failed, no session opened");
                return DeliveryReport::failure(format!("Extraction failed: {e}"));
            }
        };
        if paths.is_empty() {
            // Not an error: an all-skip mask compiles to the minimal
            // laser-off-and-home program.
            tracing::warn!("no engraveable paths found");
        }

        let scale = match ScaleFactor::fit(self.params.target_size, mask.width(), mask.height()) {
            Ok(scale) => scale,
            Err(e) => {
                return DeliveryReport::failure(format!("Invalid conversion parameters: {e}"));
            }
        };

        let program = compile(&paths, scale, &self.params.compiler);
        self.stream_program(&program).await
    }

    fn binarizer(&self) -> Binarizer {
        Binarizer::new(self.params.threshold).with_invert(self.params.invert)
    }

    /// Evaluate extraction strategies in priority order.
    ///
    /// The first strategy that completes wins; nothing is retried after
    /// a success. Only if every strategy fails does the conversion
    /// abort.
    fn extract_paths(
        &self,
        mask: &BinaryMask,
    ) -> std::result::Result<Vec<TracedPath>, ExtractionError> {
        type Strategy<'a> = (
            &'static str,
            Box<dyn Fn() -> CamToolResult<Vec<TracedPath>> + 'a>,
        );

        let strategies: Vec<Strategy<'_>> = match self.params.style {
            EngraveStyle::Vector => vec![
                (
                    "vector-trace",
                    Box::new(|| extract_loops(mask, &self.params.trace)),
                ),
                ("fallback-scan", Box::new(|| Ok(extract_runs_simple(mask)))),
            ],
            EngraveStyle::Raster => vec![
                ("raster-scan", Box::new(|| Ok(extract_runs(mask)))),
                ("fallback-scan", Box::new(|| Ok(extract_runs_simple(mask)))),
            ],
        };

        let mut last_error = String::new();
        for (name, strategy) in strategies {
            match strategy() {
                Ok(paths) => {
                    tracing::debug!(strategy = name, paths = paths.len(), "extraction complete");
                    return Ok(paths);
                }
                Err(e) => {
                    tracing::warn!(strategy = name, error = %e, "extraction strategy failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(ExtractionError::AllStrategiesFailed { last_error })
    }

    /// Acquire the endpoint, open a session, and stream the program
    async fn stream_program(&self, program: &ToolpathProgram) -> DeliveryReport {
        let _guard = self.endpoint.acquire().await;

        let mut session = match DeviceSession::connect(
            self.endpoint.host(),
            self.endpoint.port(),
            self.params.session.clone(),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                return DeliveryReport::failure(format!("Connection failed: {e}"));
            }
        };

        session.stream(program).await
    }
}
