//! Process utility functions

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn get_available_port() -> Option<u16> {
    port_scanner::request_open_port()
}

/// The configured port, or any free one when it is `0`
pub fn resolve_port(port: u16) -> Result<u16> {
    match port {
        0 => get_available_port().ok_or_else(|| anyhow!("no free port available")),
        port => Ok(port),
    }
}
