//! Deferred recovery callbacks
//!
//! Callbacks are never cancelled. Each one captures the record's `seq` when it
//! is armed and the target re-checks that value under the registry lock when
//! the timer fires; a later mutation makes an older callback inert.

use crate::config::ActivityTimings;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Kinds of deferred callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Watchdog {
    /// Force idle after prolonged silence
    Stale,
    /// Demote a `tool` state that never saw its completion
    ToolMax,
    /// Commit a debounced idle transition
    Cooldown,
}

impl Watchdog {
    pub fn as_str(&self) -> &'static str {
        match self {
            Watchdog::Stale => "stale",
            Watchdog::ToolMax => "tool_max",
            Watchdog::Cooldown => "cooldown",
        }
    }
}

/// Receiver of fired callbacks
pub trait WatchdogTarget: Clone + Send + Sync + 'static {
    fn fire(&self, watchdog: Watchdog, agent_id: &str, armed_seq: u64);
}

/// Arms fire-and-forget timers on the current tokio runtime
#[derive(Debug, Clone, Copy)]
pub struct WatchdogScheduler {
    timings: ActivityTimings,
}

impl WatchdogScheduler {
    pub fn new(timings: ActivityTimings) -> Self {
        Self { timings }
    }

    pub fn timings(&self) -> ActivityTimings {
        self.timings
    }

    pub fn delay(&self, watchdog: Watchdog) -> Duration {
        match watchdog {
            Watchdog::Stale => self.timings.stale(),
            Watchdog::ToolMax => self.timings.tool_max(),
            Watchdog::Cooldown => self.timings.cooldown(),
        }
    }

    /// Arm one callback. Returns `false` when no runtime is available.
    pub fn arm<T: WatchdogTarget>(&self, target: &T, watchdog: Watchdog, agent_id: &str, seq: u64) -> bool {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    agent_id = %agent_id,
                    watchdog = watchdog.as_str(),
                    "No tokio runtime; watchdog not armed"
                );
                return false;
            }
        };

        let deadline = Instant::now() + self.delay(watchdog);
        let target = target.clone();
        let agent_id = agent_id.to_string();
        debug!(agent_id = %agent_id, watchdog = watchdog.as_str(), seq, "Watchdog armed");

        handle.spawn(async move {
            sleep_until(deadline).await;
            target.fire(watchdog, &agent_id, seq);
        });
        true
    }

    /// Arm the stale and tool-max watchdogs that follow every state change
    pub fn arm_activity_watchdogs<T: WatchdogTarget>(&self, target: &T, agent_id: &str, seq: u64) {
        self.arm(target, Watchdog::Stale, agent_id, seq);
        self.arm(target, Watchdog::ToolMax, agent_id, seq);
    }
}
