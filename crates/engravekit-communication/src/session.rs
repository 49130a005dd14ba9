//! Device streaming session
//!
//! Owns a connected transport and streams a toolpath program one
//! command at a time: send a line, wait (bounded) for the reply, apply
//! the inter-command throttle, repeat. The controller buffer is assumed
//! to hold a single outstanding command, so there is no pipelining and
//! no reordering.
//!
//! Acknowledgment accounting is deliberately asymmetric by default: a
//! reply carrying a recognized token counts as acknowledged, a silent
//! timeout also counts as acknowledged (a mute controller must not
//! stall or fail a job), and a reply without a token counts against the
//! session. The timeout leniency is configurable via
//! [`AckTimeoutPolicy`].

use crate::transport::{LineTransport, TcpLineTransport};
use engravekit_camtools::{Command, ToolpathProgram};
use engravekit_core::{DeliveryReport, Error, Result, SessionState};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// Reply tokens that count as a successful acknowledgment
/// (matched case-insensitively, anywhere in the reply)
const ACK_TOKENS: &[&str] = &["ok", "ready", "done"];

/// How a silent controller is counted, per command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckTimeoutPolicy {
    /// A reply timeout counts as acknowledged. The default: firmware
    /// that executes without replying must not sink the whole job.
    CountAsAcknowledged,
    /// A reply timeout counts as not acknowledged.
    CountAsFailed,
}

/// Configuration for a streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bound on the endpoint dial
    pub connect_timeout: Duration,
    /// Bound on each per-command acknowledgment wait
    pub ack_timeout: Duration,
    /// Fixed delay after every command, so the controller is never
    /// overrun
    pub command_delay: Duration,
    /// Minimum acknowledged ratio (exclusive) for overall success
    pub success_threshold: f64,
    /// How reply timeouts are counted
    pub timeout_policy: AckTimeoutPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            ack_timeout: Duration::from_secs(1),
            command_delay: Duration::from_millis(20),
            success_threshold: 0.90,
            timeout_policy: AckTimeoutPolicy::CountAsAcknowledged,
        }
    }
}

/// Whether a controller reply carries a recognized success token
fn is_ack(reply: &str) -> bool {
    let lower = reply.to_ascii_lowercase();
    ACK_TOKENS.iter().any(|token| lower.contains(token))
}

/// Outcome of delivering a single command
enum Delivery {
    Acknowledged,
    NotAcknowledged,
}

/// A streaming session against one controller endpoint
///
/// Opened, streamed, and closed within a single orchestration call.
/// Whatever happens - completion, connection loss, or cancellation -
/// the session forces a laser-off command and releases the transport
/// before reporting.
pub struct DeviceSession<T: LineTransport> {
    id: Uuid,
    transport: T,
    config: SessionConfig,
    state: SessionState,
    sent: usize,
    acknowledged: usize,
    cancelled: Arc<AtomicBool>,
}

impl DeviceSession<TcpLineTransport> {
    /// Dial a TCP endpoint and return a connected session.
    ///
    /// # Errors
    /// Fails when the dial times out or is refused; no retry happens
    /// here - retrying is an external policy.
    pub async fn connect(host: &str, port: u16, config: SessionConfig) -> Result<Self> {
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, host, port, "connecting to controller");
        match TcpLineTransport::connect(host, port, config.connect_timeout).await {
            Ok(transport) => {
                tracing::info!(session = %id, peer = transport.peer(), "controller connected");
                Ok(Self::from_parts(id, transport, config))
            }
            Err(e) => {
                tracing::error!(session = %id, error = %e, "controller connection failed");
                Err(e)
            }
        }
    }
}

impl<T: LineTransport> DeviceSession<T> {
    /// Wrap an already-connected transport (used by tests and custom
    /// links)
    pub fn with_transport(transport: T, config: SessionConfig) -> Self {
        Self::from_parts(Uuid::new_v4(), transport, config)
    }

    fn from_parts(id: Uuid, transport: T, config: SessionConfig) -> Self {
        Self {
            id,
            transport,
            config,
            state: SessionState::Connected,
            sent: 0,
            acknowledged: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle for aborting the stream between commands
    ///
    /// Setting the flag stops streaming at the next command boundary;
    /// the laser-off and transport-release guarantees still apply.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Stream a program to the controller and report the outcome.
    ///
    /// Commands are delivered strictly in program order, one in flight
    /// at a time. A garbled reply or a per-command send failure is
    /// counted against the session but does not stop it; losing the
    /// connection does.
    pub async fn stream(&mut self, program: &ToolpathProgram) -> DeliveryReport {
        let lines: Vec<String> = program.commands().iter().map(Command::to_string).collect();
        self.stream_lines(&lines).await
    }

    /// Stream raw program text, one command per line.
    ///
    /// Blank lines and `;` comment lines are dropped before streaming;
    /// everything else goes to the controller verbatim.
    pub async fn stream_text(&mut self, text: &str) -> DeliveryReport {
        let lines: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(';'))
            .map(str::to_string)
            .collect();
        self.stream_lines(&lines).await
    }

    async fn stream_lines(&mut self, lines: &[String]) -> DeliveryReport {
        if self.state.is_terminal() {
            return DeliveryReport::failure(format!("session already {}", self.state));
        }

        self.state = SessionState::Streaming;
        let total = lines.len();
        tracing::info!(session = %self.id, commands = total, "streaming program");

        let mut abort: Option<Error> = None;
        let mut was_cancelled = false;

        for (index, line) in lines.iter().enumerate() {
            if self.cancelled.load(Ordering::Relaxed) {
                tracing::warn!(session = %self.id, delivered = self.sent, "stream cancelled");
                was_cancelled = true;
                break;
            }

            match self.deliver(line).await {
                Ok(outcome) => {
                    self.sent += 1;
                    if matches!(outcome, Delivery::Acknowledged) {
                        self.acknowledged += 1;
                    }
                }
                Err(e) => {
                    self.sent += 1;
                    abort = Some(e);
                    break;
                }
            }

            if index % 10 == 0 {
                tracing::debug!(session = %self.id, progress = index, total, "streaming");
            }
            sleep(self.config.command_delay).await;
        }

        self.close(total, abort, was_cancelled).await
    }

    /// Send one command line and wait for its acknowledgment.
    ///
    /// `Err` means the connection itself is gone and streaming must
    /// abort; every per-command problem is folded into the returned
    /// [`Delivery`].
    async fn deliver(&mut self, line: &str) -> Result<Delivery> {
        if let Err(e) = self.transport.send_line(line).await {
            if e.is_connection_lost() {
                return Err(e);
            }
            tracing::warn!(session = %self.id, %line, error = %e, "send failed, skipping command");
            return Ok(Delivery::NotAcknowledged);
        }

        match self.transport.recv_line(self.config.ack_timeout).await {
            Ok(Some(reply)) if is_ack(&reply) => Ok(Delivery::Acknowledged),
            Ok(Some(reply)) => {
                tracing::warn!(session = %self.id, %line, %reply, "unexpected controller reply");
                Ok(Delivery::NotAcknowledged)
            }
            Ok(None) => match self.config.timeout_policy {
                AckTimeoutPolicy::CountAsAcknowledged => {
                    tracing::debug!(session = %self.id, %line, "no reply within ack timeout");
                    Ok(Delivery::Acknowledged)
                }
                AckTimeoutPolicy::CountAsFailed => {
                    tracing::warn!(session = %self.id, %line, "no reply within ack timeout");
                    Ok(Delivery::NotAcknowledged)
                }
            },
            Err(e) => Err(e),
        }
    }

    /// Force the laser off, release the transport, and build the
    /// report. Runs on every exit path.
    async fn close(
        &mut self,
        total: usize,
        abort: Option<Error>,
        was_cancelled: bool,
    ) -> DeliveryReport {
        // Safety invariant: the head must never be parked with the
        // laser firing, whatever state the stream ended in.
        if let Err(e) = self.transport.send_line(&Command::LaserOff.to_string()).await {
            tracing::warn!(session = %self.id, error = %e, "failed to force laser off");
        }
        let _ = self.transport.shutdown().await;

        let report = match abort {
            Some(error) => {
                self.state = SessionState::Failed;
                tracing::error!(session = %self.id, %error, "session failed mid-stream");
                DeliveryReport::aborted(
                    self.sent,
                    self.acknowledged,
                    format!(
                        "Connection failed: {} after {}/{} commands",
                        error, self.sent, total
                    ),
                )
            }
            None if was_cancelled => {
                self.state = SessionState::Closed;
                DeliveryReport::aborted(
                    self.sent,
                    self.acknowledged,
                    format!("Cancelled after {}/{} commands", self.sent, total),
                )
            }
            None => {
                self.state = SessionState::Closed;
                DeliveryReport::from_counters(
                    self.sent,
                    self.acknowledged,
                    self.config.success_threshold,
                )
            }
        };

        tracing::info!(
            session = %self.id,
            state = %self.state,
            sent = report.commands_sent,
            acknowledged = report.commands_acknowledged,
            "session closed: {}",
            report.message
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_tokens_match_case_insensitively_anywhere() {
        assert!(is_ack("ok"));
        assert!(is_ack("OK"));
        assert!(is_ack("Ready."));
        assert!(is_ack("cmd done"));
        assert!(!is_ack("error:9"));
        assert!(!is_ack(""));
    }

    #[test]
    fn default_config_is_lenient() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout_policy, AckTimeoutPolicy::CountAsAcknowledged);
        assert!((config.success_threshold - 0.90).abs() < 1e-12);
    }
}
