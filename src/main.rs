use anyhow::Result;
use clap::{Parser, ValueEnum};
use engravekit::{
    init_logging, AckTimeoutPolicy, ConversionOrchestrator, ConversionParams, EngraveStyle,
    Endpoint,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Style {
    /// Trace region boundaries into closed loops
    Vector,
    /// Fill regions with zig-zag raster runs
    Raster,
}

impl From<Style> for EngraveStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Vector => EngraveStyle::Vector,
            Style::Raster => EngraveStyle::Raster,
        }
    }
}

/// Convert a raster image to a laser toolpath and stream it to a
/// controller.
#[derive(Parser, Debug)]
#[command(name = "engravekit", version)]
struct Cli {
    /// Input bitmap; decoded as grayscale
    image: PathBuf,

    /// Controller host name or address
    #[arg(long)]
    host: String,

    /// Controller TCP port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Engraving style
    #[arg(long, value_enum, default_value_t = Style::Vector)]
    style: Style,

    /// Binarization threshold; samples below it are engraved
    #[arg(long, default_value_t = 127)]
    threshold: u8,

    /// Engrave light pixels instead of dark ones
    #[arg(long)]
    invert: bool,

    /// Laser power for engrave moves (0-255)
    #[arg(long, default_value_t = 255)]
    power: u8,

    /// Rapid-move feed rate in mm/min
    #[arg(long, default_value_t = 5000.0)]
    travel_rate: f64,

    /// Engrave-move feed rate in mm/min
    #[arg(long, default_value_t = 1500.0)]
    engrave_rate: f64,

    /// Physical size of the engraved area's longest side, in mm
    #[arg(long, default_value_t = 20.0)]
    size: f64,

    /// Discard boundaries enclosing no more than this area, in px²
    #[arg(long, default_value_t = 5.0)]
    min_area: f64,

    /// Boundary simplification tolerance as a fraction of perimeter
    #[arg(long, default_value_t = 0.002)]
    epsilon_ratio: f64,

    /// Minimum acknowledged ratio (exclusive) for overall success
    #[arg(long, default_value_t = 0.90)]
    success_threshold: f64,

    /// Connect timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    connect_timeout_ms: u64,

    /// Per-command acknowledgment timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    ack_timeout_ms: u64,

    /// Delay after each command in milliseconds
    #[arg(long, default_value_t = 20)]
    command_delay_ms: u64,

    /// Count silent (timed-out) acknowledgments as failures instead of
    /// successes
    #[arg(long)]
    strict_acks: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        built = env!("BUILD_DATE"),
        "engravekit starting"
    );

    let mut params = ConversionParams {
        style: cli.style.into(),
        threshold: cli.threshold,
        invert: cli.invert,
        target_size: cli.size,
        ..ConversionParams::default()
    };
    params.trace.min_contour_area = cli.min_area;
    params.trace.epsilon_ratio = cli.epsilon_ratio;
    params.compiler.laser_power = cli.power;
    params.compiler.travel_rate = cli.travel_rate;
    params.compiler.engrave_rate = cli.engrave_rate;
    params.session.success_threshold = cli.success_threshold;
    params.session.connect_timeout = Duration::from_millis(cli.connect_timeout_ms);
    params.session.ack_timeout = Duration::from_millis(cli.ack_timeout_ms);
    params.session.command_delay = Duration::from_millis(cli.command_delay_ms);
    if cli.strict_acks {
        params.session.timeout_policy = AckTimeoutPolicy::CountAsFailed;
    }

    let endpoint = Arc::new(Endpoint::new(cli.host, cli.port));
    let orchestrator = ConversionOrchestrator::new(endpoint, params);
    let report = orchestrator.convert_file(&cli.image).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.overall_success {
        std::process::exit(1);
    }
    Ok(())
}
