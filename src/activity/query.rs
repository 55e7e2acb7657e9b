//! Snapshot queries over the activity registry

use super::registry::{ActivityRecord, ActivityState, SharedRegistry};
use crate::clock::Clock;
use crate::config::ActivityConfig;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// State names shown to snapshot consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UiState {
    Wait,
    Think,
    Tool,
    Reply,
    Error,
}

impl From<ActivityState> for UiState {
    fn from(state: ActivityState) -> Self {
        match state {
            ActivityState::Idle => UiState::Wait,
            ActivityState::Thinking => UiState::Think,
            ActivityState::Tool => UiState::Tool,
            ActivityState::Reply => UiState::Reply,
            ActivityState::Error => UiState::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMeta {
    pub active: bool,
    pub since_ms: u64,
}

/// Raw record fields, for debugging the state machine from the outside
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDebug {
    pub state: ActivityState,
    pub last_event_ms: u64,
    pub seq: u64,
    pub details: Option<Value>,
}

/// One agent in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "state")]
    pub ui_state: UiState,
    pub meta: AgentMeta,
    #[serde(rename = "debug")]
    pub debug_details: AgentDebug,
}

/// Snapshot endpoint body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub ok: bool,
    /// Unix seconds
    pub generated_at: u64,
    pub poll_seconds: u64,
    pub agents: Vec<AgentView>,
    pub errors: Vec<String>,
}

/// Display-name resolution: override, then identity name, then the raw id
#[derive(Debug, Clone, Default)]
pub struct DisplayNames {
    overrides: BTreeMap<String, String>,
    identities: BTreeMap<String, String>,
}

impl DisplayNames {
    pub fn new(overrides: BTreeMap<String, String>, identities: BTreeMap<String, String>) -> Self {
        Self { overrides, identities }
    }

    pub fn from_config(config: &ActivityConfig) -> Self {
        Self::new(config.display_names.clone(), config.identities.clone())
    }

    pub fn resolve(&self, agent_id: &str) -> String {
        self.overrides
            .get(agent_id)
            .or_else(|| self.identities.get(agent_id))
            .cloned()
            .unwrap_or_else(|| agent_id.to_string())
    }
}

/// Read side of the tracker
#[derive(Clone)]
pub struct QueryService {
    registry: SharedRegistry,
    clock: Arc<dyn Clock>,
    names: Arc<DisplayNames>,
}

impl QueryService {
    pub fn new(registry: SharedRegistry, clock: Arc<dyn Clock>, names: DisplayNames) -> Self {
        Self {
            registry,
            clock,
            names: Arc::new(names),
        }
    }

    /// View of every allowed agent, in the given order
    ///
    /// Configured agents that never sent a notification are bootstrapped as idle.
    pub fn snapshot(&self, allowed_agent_ids: &[String]) -> Vec<AgentView> {
        let now = self.clock.epoch_ms();
        let mut registry = self.registry.lock();
        allowed_agent_ids
            .iter()
            .map(|agent_id| self.view(registry.ensure(agent_id, now)))
            .collect()
    }

    pub fn view(&self, record: &ActivityRecord) -> AgentView {
        AgentView {
            id: record.agent_id().to_string(),
            display_name: self.names.resolve(record.agent_id()),
            ui_state: record.state.into(),
            meta: AgentMeta {
                active: record.state.is_active(),
                since_ms: record.since_ms,
            },
            debug_details: AgentDebug {
                state: record.state,
                last_event_ms: record.last_event_ms,
                seq: record.seq,
                details: record.details.clone(),
            },
        }
    }

    /// Full endpoint body for `allowed_agent_ids`
    pub fn snapshot_response(&self, allowed_agent_ids: &[String], poll_seconds: u64) -> SnapshotResponse {
        SnapshotResponse {
            ok: true,
            generated_at: self.clock.epoch_ms() / 1_000,
            poll_seconds,
            agents: self.snapshot(allowed_agent_ids),
            errors: Vec::new(),
        }
    }
}
