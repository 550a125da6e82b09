//! Liveness monitoring for a socket session.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::{ChannelConnection, Connection};

/// Why the heartbeat loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// No client activity for `max_missed` consecutive intervals.
    TimedOut,
    /// The session or server shut down.
    Cancelled,
}

/// Consecutive silent intervals tolerated before a client is declared dead.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Watch `connection` until it goes quiet or `cancel` fires.
///
/// Each tick consumes the connection's alive flag. Any inbound frame or pong
/// sets it again via [`ChannelConnection::mark_alive`].
pub async fn run_heartbeat(
    connection: Arc<ChannelConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatOutcome {
    let limit = max_missed(interval, timeout);
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                    continue;
                }
                missed += 1;
                if missed >= limit {
                    debug!(
                        conn_id = %connection.id(),
                        missed,
                        silent_ms = u64::try_from(connection.last_seen_elapsed().as_millis()).unwrap_or(u64::MAX),
                        "heartbeat timed out"
                    );
                    return HeartbeatOutcome::TimedOut;
                }
            }
            () = cancel.cancelled() => return HeartbeatOutcome::Cancelled,
        }
    }
}
