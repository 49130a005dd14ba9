//! Exclusive controller endpoints
//!
//! A physical controller accepts one connection at a time, so each
//! endpoint is an owned resource with serialized access: conversions
//! targeting the same endpoint queue on its lock instead of
//! interleaving command streams.

use tokio::sync::{Mutex, MutexGuard};

/// A physical controller endpoint with exclusive-session semantics
#[derive(Debug)]
pub struct Endpoint {
    host: String,
    port: u16,
    guard: Mutex<()>,
}

impl Endpoint {
    /// Describe a controller endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            guard: Mutex::new(()),
        }
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The `host:port` address string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Acquire exclusive use of the endpoint, waiting behind any
    /// session already running against it. Hold the returned guard for
    /// the whole session.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_formatting() {
        let endpoint = Endpoint::new("192.168.29.109", 8080);
        assert_eq!(endpoint.address(), "192.168.29.109:8080");
    }
}
