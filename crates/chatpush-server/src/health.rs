//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::registry::ConnectionRegistry;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the server is running, `"shutting_down"` once it is draining.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket connections, grouped and global.
    pub connections: usize,
    /// Accounts with at least one live connection.
    pub active_accounts: usize,
}

/// Build a health response from the registry's current state.
pub fn health_check(
    start_time: Instant,
    registry: &ConnectionRegistry,
    shutting_down: bool,
) -> HealthResponse {
    let stats = registry.stats();
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.total,
        active_accounts: stats.accounts.len(),
    }
}
