//! Time source shared by the activity tracker and its watchdogs
//!
//! Timestamps are epoch milliseconds. The default clock reads wall time once
//! and then advances with `tokio::time::Instant`, so record timestamps and
//! watchdog deadlines move together, including under paused test time.

use chrono::Utc;
use tokio::time::Instant;

/// A clock that provides the current time in epoch milliseconds
pub trait Clock: Send + Sync + 'static {
    fn epoch_ms(&self) -> u64;
}

/// Wall-clock anchored, tokio-driven clock
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor_ms: u64,
    started: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now().timestamp_millis().max(0) as u64)
    }

    /// Create a clock that reports `anchor_ms` right now
    pub fn anchored_at(anchor_ms: u64) -> Self {
        Self {
            anchor_ms,
            started: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn epoch_ms(&self) -> u64 {
        self.anchor_ms + self.started.elapsed().as_millis() as u64
    }
}
