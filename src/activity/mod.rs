//! Agent activity tracking
//!
//! Lifecycle notifications flow through the [`TransitionEngine`] into the
//! [`ActivityRegistry`]; the [`WatchdogScheduler`] bounds how long a state can
//! survive notification loss; the [`QueryService`] projects the registry into
//! snapshots.

pub mod engine;
pub mod query;
pub mod registry;
pub mod watchdog;

pub use engine::TransitionEngine;
pub use query::{AgentDebug, AgentMeta, AgentView, DisplayNames, QueryService, SnapshotResponse, UiState};
pub use registry::{ActivityRecord, ActivityRegistry, ActivityState, SharedRegistry};
pub use watchdog::{Watchdog, WatchdogScheduler, WatchdogTarget};

use crate::clock::{Clock, TokioClock};
use crate::config::ActivityConfig;
use std::sync::Arc;

/// One independent tracker: a registry with its engine and query side
#[derive(Clone)]
pub struct ActivityTracker {
    engine: TransitionEngine,
    query: QueryService,
    allowed_agents: Arc<Vec<String>>,
    poll_seconds: u64,
}

impl ActivityTracker {
    pub fn new(config: &ActivityConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock::new()))
    }

    pub fn with_clock(config: &ActivityConfig, clock: Arc<dyn Clock>) -> Self {
        let registry = SharedRegistry::new();
        Self {
            engine: TransitionEngine::new(registry.clone(), clock.clone(), config.timings),
            query: QueryService::new(registry, clock, DisplayNames::from_config(config)),
            allowed_agents: Arc::new(config.allowed_agents()),
            poll_seconds: config.poll_seconds,
        }
    }

    pub fn engine(&self) -> &TransitionEngine {
        &self.engine
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn allowed_agents(&self) -> &[String] {
        &self.allowed_agents
    }

    /// Snapshot of the configured agents
    pub fn snapshot(&self) -> Vec<AgentView> {
        self.query.snapshot(&self.allowed_agents)
    }

    pub fn snapshot_response(&self) -> SnapshotResponse {
        self.query.snapshot_response(&self.allowed_agents, self.poll_seconds)
    }
}
