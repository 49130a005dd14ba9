//! Full-pipeline tests: image in, scripted TCP controller out.

use engravekit::{
    AckTimeoutPolicy, ConversionOrchestrator, ConversionParams, EngraveStyle, Endpoint,
};
use image::{GrayImage, Luma};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Spawn a one-connection controller stand-in. Records every received
/// line; replies "ok" to each when `respond` is set, stays silent
/// otherwise.
async fn spawn_controller(respond: bool) -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        log.lock().unwrap().push(line.trim().to_string());
                        if respond {
                            let _ = write_half.write_all(b"ok\n").await;
                        }
                    }
                }
            }
        }
    });

    (port, received)
}

fn fast_params(style: EngraveStyle) -> ConversionParams {
    let mut params = ConversionParams {
        style,
        target_size: 10.0,
        ..ConversionParams::default()
    };
    params.session.command_delay = Duration::ZERO;
    params.session.ack_timeout = Duration::from_millis(100);
    params
}

fn dark_square() -> GrayImage {
    GrayImage::from_pixel(10, 10, Luma([0]))
}

#[tokio::test]
async fn raster_conversion_streams_every_command() {
    let (port, received) = spawn_controller(true).await;
    let endpoint = Arc::new(Endpoint::new("127.0.0.1", port));
    let orchestrator = ConversionOrchestrator::new(endpoint, fast_params(EngraveStyle::Raster));

    let report = orchestrator.convert_image(&dark_square()).await;

    // 10 runs of 4 commands each, plus the 8-command program brackets.
    assert!(report.overall_success, "report: {}", report.message);
    assert_eq!(report.commands_sent, 48);
    assert_eq!(report.commands_acknowledged, 48);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 49, "48 commands + forced laser-off");
    assert_eq!(received[0], "G21");
    assert_eq!(received[1], "G90");
    assert_eq!(received.last().unwrap(), "M5");
}

#[tokio::test]
async fn vector_conversion_traces_the_square_boundary() {
    let (port, received) = spawn_controller(true).await;
    let endpoint = Arc::new(Endpoint::new("127.0.0.1", port));
    let orchestrator = ConversionOrchestrator::new(endpoint, fast_params(EngraveStyle::Vector));

    let report = orchestrator.convert_image(&dark_square()).await;

    // One 4-vertex loop: rapid + laser on + 4 engrave moves + laser off,
    // inside the 8-command brackets.
    assert!(report.overall_success, "report: {}", report.message);
    assert_eq!(report.commands_sent, 15);

    let received = received.lock().unwrap();
    let engraves: Vec<_> = received.iter().filter(|l| l.starts_with("G1 X")).collect();
    assert_eq!(engraves.len(), 4);
    assert!(received.iter().any(|l| l == "M3 S255"));
}

#[tokio::test]
async fn blank_image_still_delivers_the_minimal_program() {
    let (port, received) = spawn_controller(true).await;
    let endpoint = Arc::new(Endpoint::new("127.0.0.1", port));
    let orchestrator = ConversionOrchestrator::new(endpoint, fast_params(EngraveStyle::Vector));

    let blank = GrayImage::from_pixel(10, 10, Luma([255]));
    let report = orchestrator.convert_image(&blank).await;

    assert!(report.overall_success);
    assert_eq!(report.commands_sent, 8);
    assert_eq!(received.lock().unwrap().last().unwrap(), "M5");
}

#[tokio::test]
async fn file_conversion_loads_and_streams() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("label.png");
    dark_square().save(&path).unwrap();

    let (port, _) = spawn_controller(true).await;
    let endpoint = Arc::new(Endpoint::new("127.0.0.1", port));
    let orchestrator = ConversionOrchestrator::new(endpoint, fast_params(EngraveStyle::Raster));

    let report = orchestrator.convert_file(&path).await;
    assert!(report.overall_success, "report: {}", report.message);
    assert_eq!(report.commands_sent, 48);
}

#[tokio::test]
async fn unreadable_image_never_opens_a_session() {
    // Port 9 (discard) would refuse anyway, but the conversion must
    // fail before dialing at all.
    let endpoint = Arc::new(Endpoint::new("127.0.0.1", 9));
    let orchestrator = ConversionOrchestrator::new(endpoint, fast_params(EngraveStyle::Vector));

    let report = orchestrator.convert_file("/nonexistent/input.png").await;

    assert!(!report.overall_success);
    assert_eq!(report.commands_sent, 0);
    assert!(report.message.contains("Image load failed"));
}

#[tokio::test]
async fn refused_connection_reports_instead_of_erroring() {
    // Bind then drop, so the port is known-dead.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint = Arc::new(Endpoint::new("127.0.0.1", port));
    let orchestrator = ConversionOrchestrator::new(endpoint, fast_params(EngraveStyle::Raster));

    let report = orchestrator.convert_image(&dark_square()).await;

    assert!(!report.overall_success);
    assert_eq!(report.commands_sent, 0);
    assert!(report.message.contains("Connection failed"));
}

#[tokio::test]
async fn silent_controller_outcome_follows_the_timeout_policy() {
    // Lenient (default): a mute controller still yields success.
    let (port, _) = spawn_controller(false).await;
    let endpoint = Arc::new(Endpoint::new("127.0.0.1", port));
    let blank = GrayImage::from_pixel(10, 10, Luma([255]));
    let orchestrator = ConversionOrchestrator::new(endpoint, fast_params(EngraveStyle::Vector));
    let report = orchestrator.convert_image(&blank).await;
    assert!(report.overall_success);
    assert_eq!(report.commands_acknowledged, 8);

    // Strict: the same mute controller fails the job.
    let (port, _) = spawn_controller(false).await;
    let endpoint = Arc::new(Endpoint::new("127.0.0.1", port));
    let mut params = fast_params(EngraveStyle::Vector);
    params.session.timeout_policy = AckTimeoutPolicy::CountAsFailed;
    let orchestrator = ConversionOrchestrator::new(endpoint, params);
    let report = orchestrator.convert_image(&blank).await;
    assert!(!report.overall_success);
    assert_eq!(report.commands_acknowledged, 0);
    assert_eq!(report.commands_sent, 8);
}
