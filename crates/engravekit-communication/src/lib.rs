//! # EngraveKit Communication
//!
//! Device communication for EngraveKit: a line-oriented TCP transport,
//! the streaming session state machine with per-command acknowledgment
//! accounting, and exclusive endpoint ownership.

pub mod endpoint;
pub mod session;
pub mod transport;

pub use endpoint::Endpoint;
pub use session::{AckTimeoutPolicy, DeviceSession, SessionConfig};
pub use transport::{LineTransport, TcpLineTransport};
