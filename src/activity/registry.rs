//! Activity registry - one record per tracked agent

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Internal activity state of an agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    #[default]
    Idle,
    Thinking,
    Tool,
    Reply,
    Error,
}

impl ActivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Idle => "idle",
            ActivityState::Thinking => "thinking",
            ActivityState::Tool => "tool",
            ActivityState::Reply => "reply",
            ActivityState::Error => "error",
        }
    }

    pub fn is_active(&self) -> bool {
        *self != ActivityState::Idle
    }
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity record for a single agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    agent_id: String,
    pub state: ActivityState,
    /// Epoch ms of the last state change
    pub since_ms: u64,
    /// Epoch ms of the most recent notification of any kind
    pub last_event_ms: u64,
    /// Cause of the current state; replaced on every transition
    pub details: Option<Value>,
    /// Bumped once per mutation or newly scheduled callback
    pub seq: u64,
}

impl ActivityRecord {
    pub fn new(agent_id: impl Into<String>, now_ms: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            state: ActivityState::Idle,
            since_ms: now_ms,
            last_event_ms: now_ms,
            details: None,
            seq: 0,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Apply a transition and return the new sequence number
    ///
    /// `since_ms` only moves when the state actually changes.
    pub fn transition(&mut self, next: ActivityState, details: Option<Value>, now_ms: u64) -> u64 {
        self.seq += 1;
        if next != self.state {
            self.state = next;
            self.since_ms = now_ms;
        }
        self.last_event_ms = now_ms.max(self.since_ms);
        self.details = details;
        self.seq
    }

    /// Supersede every pending callback without touching the state
    pub fn bump_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Note a notification that schedules an idle cooldown
    pub fn begin_cooldown(&mut self, now_ms: u64) -> u64 {
        self.last_event_ms = now_ms.max(self.since_ms);
        self.bump_seq()
    }

    /// Force the idle state; sequence number is left alone
    pub fn settle_idle(&mut self, details: Option<Value>, now_ms: u64) {
        self.state = ActivityState::Idle;
        self.since_ms = now_ms.max(self.since_ms);
        self.last_event_ms = self.since_ms;
        self.details = details;
    }

    /// Whether a callback armed at `seq` is still the latest action
    pub fn is_current(&self, seq: u64) -> bool {
        self.seq == seq
    }
}

/// Map of agent id to activity record
#[derive(Debug, Default)]
pub struct ActivityRegistry {
    records: HashMap<String, ActivityRecord>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the record for `agent_id`, creating an idle one on first access
    pub fn ensure(&mut self, agent_id: &str, now_ms: u64) -> &mut ActivityRecord {
        self.records
            .entry(agent_id.to_string())
            .or_insert_with(|| ActivityRecord::new(agent_id, now_ms))
    }

    pub fn get(&self, agent_id: &str) -> Option<&ActivityRecord> {
        self.records.get(agent_id)
    }

    pub fn get_mut(&mut self, agent_id: &str) -> Option<&mut ActivityRecord> {
        self.records.get_mut(agent_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Tracked agent ids, sorted
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Registry handle shared by the transition engine and the query service
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<ActivityRegistry>>);

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the registry. A panic in another holder does not make the map unusable.
    pub fn lock(&self) -> MutexGuard<'_, ActivityRegistry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the record for `agent_id`, if tracked
    pub fn record(&self, agent_id: &str) -> Option<ActivityRecord> {
        self.lock().get(agent_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_bootstraps_idle_record() {
        let mut registry = ActivityRegistry::new();
        let record = registry.ensure("main", 1_000);

        assert_eq!(record.agent_id(), "main");
        assert_eq!(record.state, ActivityState::Idle);
        assert_eq!(record.since_ms, 1_000);
        assert_eq!(record.since_ms, record.last_event_ms);
        assert_eq!(record.details, None);
        assert_eq!(record.seq, 0);
    }

    #[test]
    fn test_ensure_returns_existing_record() {
        let mut registry = ActivityRegistry::new();
        registry.ensure("main", 1_000).transition(ActivityState::Tool, None, 1_100);

        let record = registry.ensure("main", 5_000);
        assert_eq!(record.state, ActivityState::Tool);
        assert_eq!(record.since_ms, 1_100);
        assert_eq!(record.seq, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_one_record_per_agent() {
        let mut registry = ActivityRegistry::new();
        for _ in 0..3 {
            registry.ensure("main", 1);
            registry.ensure("writer", 1);
        }
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.agent_ids(), vec!["main".to_string(), "writer".to_string()]);
    }

    #[test]
    fn test_same_state_transition_keeps_since() {
        let mut record = ActivityRecord::new("main", 1_000);
        record.transition(ActivityState::Thinking, None, 1_200);
        let seq = record.transition(ActivityState::Thinking, Some(json!({"sessionKey": "s"})), 1_900);

        assert_eq!(seq, 2);
        assert_eq!(record.since_ms, 1_200);
        assert_eq!(record.last_event_ms, 1_900);
        assert_eq!(record.details, Some(json!({"sessionKey": "s"})));
    }

    #[test]
    fn test_settle_idle_keeps_seq() {
        let mut record = ActivityRecord::new("main", 0);
        record.transition(ActivityState::Reply, Some(json!({"channel": "c"})), 10);
        let seq = record.bump_seq();
        record.settle_idle(None, 1_510);

        assert!(record.is_current(seq));
        assert_eq!(record.state, ActivityState::Idle);
        assert_eq!(record.details, None);
        assert_eq!(record.since_ms, 1_510);
        assert_eq!(record.last_event_ms, 1_510);
    }

    #[test]
    fn test_shared_registry_survives_poisoning() {
        let shared = SharedRegistry::new();
        shared.lock().ensure("main", 0);

        let clone = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock();
            panic!("handler blew up");
        })
        .join();

        assert!(shared.record("main").is_some());
    }
}
