//! Transition engine - applies lifecycle notifications to activity records
//!
//! Every mutation runs as one critical section on the shared registry.
//! Deferred callbacks compare the `seq` they were armed with against the
//! record under the same lock, so a callback acts only while it is still the
//! latest action scheduled for that agent.

use super::registry::{ActivityState, SharedRegistry};
use super::watchdog::{Watchdog, WatchdogScheduler, WatchdogTarget};
use crate::clock::Clock;
use crate::config::ActivityTimings;
use crate::notification::LifecycleEvent;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Applies notifications to the registry and arms recovery callbacks
#[derive(Clone)]
pub struct TransitionEngine {
    registry: SharedRegistry,
    clock: Arc<dyn Clock>,
    scheduler: WatchdogScheduler,
}

impl TransitionEngine {
    pub fn new(registry: SharedRegistry, clock: Arc<dyn Clock>, timings: ActivityTimings) -> Self {
        Self {
            registry,
            clock,
            scheduler: WatchdogScheduler::new(timings),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn timings(&self) -> ActivityTimings {
        self.scheduler.timings()
    }

    /// Apply one notification; returns the record's `seq` afterwards
    pub fn apply(&self, event: &LifecycleEvent) -> u64 {
        let agent_id = event.agent_id();
        match event {
            LifecycleEvent::AgentStart { session, .. } => {
                self.set_state(agent_id, ActivityState::Thinking, details_or_none(session.to_details()))
            }
            LifecycleEvent::ToolCallBegin { tool_name, session, .. } => {
                let mut details = session.to_details();
                if let Some(tool) = tool_name {
                    details.insert("toolName".into(), Value::String(tool.clone()));
                }
                self.set_state(agent_id, ActivityState::Tool, details_or_none(details))
            }
            LifecycleEvent::ToolCallEnd { session, .. } => {
                self.set_state(agent_id, ActivityState::Thinking, details_or_none(session.to_details()))
            }
            LifecycleEvent::ToolResultRecorded { session, .. } => {
                let mut details = session.to_details();
                details.insert("persisted".into(), Value::Bool(true));
                self.set_state(agent_id, ActivityState::Thinking, details_or_none(details))
            }
            LifecycleEvent::MessageSendBegin { target, session, .. } => {
                let mut details = session.to_details();
                if let Some(target) = target {
                    details.insert("target".into(), Value::String(target.clone()));
                }
                self.set_state(agent_id, ActivityState::Reply, details_or_none(details))
            }
            LifecycleEvent::MessageSendComplete { .. } => self.set_idle_with_cooldown(agent_id),
            LifecycleEvent::AgentRunComplete { success: true, .. } => self.set_idle_with_cooldown(agent_id),
            LifecycleEvent::AgentRunComplete { success: false, error, .. } => {
                let error = error.clone().unwrap_or_else(|| "agent run failed".to_string());
                self.set_state(agent_id, ActivityState::Error, Some(json!({ "error": error })));
                self.set_idle_with_cooldown(agent_id)
            }
        }
    }

    /// Move `agent_id` to `next` and re-arm the stale and tool-max watchdogs
    ///
    /// Returns the new `seq`.
    pub fn set_state(&self, agent_id: &str, next: ActivityState, details: Option<Value>) -> u64 {
        let now = self.clock.epoch_ms();
        let seq = {
            let mut registry = self.registry.lock();
            let record = registry.ensure(agent_id, now);
            let previous = record.state;
            let seq = record.transition(next, details, now);
            debug!(agent_id = %agent_id, from = %previous, to = %next, seq, "Activity transition");
            seq
        };
        self.scheduler.arm_activity_watchdogs(self, agent_id, seq);
        seq
    }

    /// Schedule a debounced transition to idle
    ///
    /// Any later mutation of the record before the cooldown elapses cancels it.
    pub fn set_idle_with_cooldown(&self, agent_id: &str) -> u64 {
        let now = self.clock.epoch_ms();
        let seq = self.registry.lock().ensure(agent_id, now).begin_cooldown(now);
        debug!(agent_id = %agent_id, seq, "Idle cooldown scheduled");
        self.scheduler.arm(self, Watchdog::Cooldown, agent_id, seq);
        seq
    }

    fn settle_cooldown(&self, agent_id: &str, armed_seq: u64) {
        let now = self.clock.epoch_ms();
        let mut registry = self.registry.lock();
        let Some(record) = registry.get_mut(agent_id) else {
            return;
        };
        if !record.is_current(armed_seq) {
            debug!(agent_id = %agent_id, armed_seq, seq = record.seq, "Cooldown superseded");
            return;
        }
        record.settle_idle(None, now);
        debug!(agent_id = %agent_id, seq = armed_seq, "Cooldown elapsed, agent idle");
    }

    fn expire_stale(&self, agent_id: &str, armed_seq: u64) {
        let now = self.clock.epoch_ms();
        let stale_ms = self.scheduler.timings().stale_ms;
        let mut registry = self.registry.lock();
        let Some(record) = registry.get_mut(agent_id) else {
            return;
        };
        if !record.is_current(armed_seq) {
            debug!(agent_id = %agent_id, armed_seq, seq = record.seq, "Stale watchdog superseded");
            return;
        }
        if now.saturating_sub(record.last_event_ms) < stale_ms {
            return;
        }
        let previous = record.state;
        record.settle_idle(Some(json!({ "stale": true })), now);
        info!(agent_id = %agent_id, previous = %previous, stale_ms, "No notifications, forcing idle");
    }

    fn cap_tool(&self, agent_id: &str, armed_seq: u64) {
        let now = self.clock.epoch_ms();
        let (thinking_seq, cooldown_seq) = {
            let mut registry = self.registry.lock();
            let Some(record) = registry.get_mut(agent_id) else {
                return;
            };
            if !record.is_current(armed_seq) || record.state != ActivityState::Tool {
                debug!(agent_id = %agent_id, armed_seq, seq = record.seq, "Tool-max watchdog inert");
                return;
            }

            let mut details = Map::new();
            details.insert("toolMax".into(), Value::Bool(true));
            if let Some(tool) = record.details.as_ref().and_then(|d| d.get("toolName")) {
                details.insert("toolName".into(), tool.clone());
            }
            let thinking_seq = record.transition(ActivityState::Thinking, Some(Value::Object(details)), now);
            (thinking_seq, record.begin_cooldown(now))
        };

        info!(
            agent_id = %agent_id,
            tool_max_ms = self.scheduler.timings().tool_max_ms,
            "Tool call exceeded its cap, demoted to thinking"
        );
        self.scheduler.arm_activity_watchdogs(self, agent_id, thinking_seq);
        self.scheduler.arm(self, Watchdog::Cooldown, agent_id, cooldown_seq);
    }
}

impl WatchdogTarget for TransitionEngine {
    fn fire(&self, watchdog: Watchdog, agent_id: &str, armed_seq: u64) {
        match watchdog {
            Watchdog::Stale => self.expire_stale(agent_id, armed_seq),
            Watchdog::ToolMax => self.cap_tool(agent_id, armed_seq),
            Watchdog::Cooldown => self.settle_cooldown(agent_id, armed_seq),
        }
    }
}

fn details_or_none(details: Map<String, Value>) -> Option<Value> {
    if details.is_empty() {
        None
    } else {
        Some(Value::Object(details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::registry::ActivityRecord;
    use crate::clock::TokioClock;
    use std::time::Duration;

    fn engine_with(timings: ActivityTimings) -> TransitionEngine {
        TransitionEngine::new(
            SharedRegistry::new(),
            Arc::new(TokioClock::anchored_at(1_000_000)),
            timings,
        )
    }

    fn engine() -> TransitionEngine {
        engine_with(ActivityTimings::default())
    }

    fn record(engine: &TransitionEngine, agent_id: &str) -> ActivityRecord {
        engine.registry().record(agent_id).expect("record exists")
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_state_updates_record() {
        let engine = engine();
        let seq = engine.set_state("main", ActivityState::Tool, Some(json!({"toolName": "search"})));

        let record = record(&engine, "main");
        assert_eq!(seq, 1);
        assert_eq!(record.state, ActivityState::Tool);
        assert_eq!(record.details, Some(json!({"toolName": "search"})));
        assert_eq!(record.since_ms, 1_000_000);
        assert!(record.since_ms <= record.last_event_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_state_keeps_since() {
        let engine = engine();
        engine.set_state("main", ActivityState::Thinking, None);
        sleep_ms(300).await;
        let seq = engine.set_state("main", ActivityState::Thinking, None);

        let record = record(&engine, "main");
        assert_eq!(seq, 2);
        assert_eq!(record.since_ms, 1_000_000);
        assert_eq!(record.last_event_ms, 1_000_300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_end_before_cap_makes_tool_max_inert() {
        let engine = engine_with(ActivityTimings {
            tool_max_ms: 100,
            ..ActivityTimings::default()
        });
        engine.set_state("main", ActivityState::Tool, Some(json!({"toolName": "search"})));
        engine.set_state("main", ActivityState::Thinking, None);

        sleep_ms(150).await;
        let record = record(&engine, "main");
        assert_eq!(record.state, ActivityState::Thinking);
        assert_eq!(record.details, None);
        assert_eq!(record.seq, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_event_defeats_pending_cooldown() {
        let engine = engine();
        engine.set_state("main", ActivityState::Reply, None);
        engine.set_idle_with_cooldown("main");

        sleep_ms(10).await;
        engine.set_state("main", ActivityState::Thinking, None);

        sleep_ms(1_590).await;
        assert_eq!(record(&engine, "main").state, ActivityState::Thinking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_settles_to_idle() {
        let engine = engine();
        engine.set_state("main", ActivityState::Reply, Some(json!({"channel": "telegram"})));
        engine.set_idle_with_cooldown("main");

        sleep_ms(1_400).await;
        assert_eq!(record(&engine, "main").state, ActivityState::Reply);

        sleep_ms(200).await;
        let record = record(&engine, "main");
        assert_eq!(record.state, ActivityState::Idle);
        assert_eq!(record.details, None);
        assert_eq!(record.since_ms, 1_001_500);
        assert_eq!(record.last_event_ms, 1_001_500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_failure_shows_error_then_idles() {
        let engine = engine();
        engine.apply(&LifecycleEvent::run_failed("main", "boom"));

        let record_now = record(&engine, "main");
        assert_eq!(record_now.state, ActivityState::Error);
        assert_eq!(record_now.details, Some(json!({"error": "boom"})));

        sleep_ms(1_600).await;
        assert_eq!(record(&engine, "main").state, ActivityState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_forces_stale_idle() {
        let engine = engine_with(ActivityTimings {
            stale_ms: 200,
            ..ActivityTimings::default()
        });
        engine.apply(&LifecycleEvent::tool_call_begin("main", "search"));

        sleep_ms(150).await;
        assert_eq!(record(&engine, "main").state, ActivityState::Tool);

        sleep_ms(100).await;
        let record = record(&engine, "main");
        assert_eq!(record.state, ActivityState::Idle);
        assert_eq!(record.details, Some(json!({"stale": true})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_cap_demotes_then_idles() {
        let engine = engine_with(ActivityTimings {
            tool_max_ms: 100,
            ..ActivityTimings::default()
        });
        engine.apply(&LifecycleEvent::tool_call_begin("main", "search"));

        sleep_ms(150).await;
        let capped = record(&engine, "main");
        assert_eq!(capped.state, ActivityState::Thinking);
        assert_eq!(capped.details, Some(json!({"toolMax": true, "toolName": "search"})));

        sleep_ms(1_500).await;
        let settled = record(&engine, "main");
        assert_eq!(settled.state, ActivityState::Idle);
        assert_eq!(settled.details, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_result_after_tool_end_is_idempotent() {
        let engine = engine();
        engine.apply(&LifecycleEvent::tool_call_begin("main", "exec"));
        sleep_ms(20).await;
        engine.apply(&LifecycleEvent::tool_call_end("main"));
        let since = record(&engine, "main").since_ms;

        sleep_ms(20).await;
        engine.apply(&LifecycleEvent::ToolResultRecorded {
            agent_id: "main".into(),
            session: Default::default(),
        });

        let record = record(&engine, "main");
        assert_eq!(record.state, ActivityState::Thinking);
        assert_eq!(record.since_ms, since);
        assert_eq!(record.details, Some(json!({"persisted": true})));
        assert_eq!(record.seq, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_maps_notifications() {
        let engine = engine();

        engine.apply(&LifecycleEvent::agent_start("main"));
        assert_eq!(record(&engine, "main").state, ActivityState::Thinking);

        engine.apply(&LifecycleEvent::message_send_begin("main", "telegram"));
        let reply = record(&engine, "main");
        assert_eq!(reply.state, ActivityState::Reply);
        assert_eq!(reply.details, Some(json!({"channel": "telegram"})));

        let seq = engine.apply(&LifecycleEvent::message_send_complete("main"));
        let pending = record(&engine, "main");
        assert_eq!(pending.state, ActivityState::Reply);
        assert_eq!(pending.seq, seq);

        engine.apply(&LifecycleEvent::run_succeeded("main"));
        sleep_ms(1_600).await;
        assert_eq!(record(&engine, "main").state, ActivityState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_agents_are_independent() {
        let engine = engine();
        engine.apply(&LifecycleEvent::tool_call_begin("main", "search"));
        engine.apply(&LifecycleEvent::agent_start("writer"));
        engine.apply(&LifecycleEvent::message_send_complete("writer"));

        sleep_ms(1_600).await;
        assert_eq!(record(&engine, "main").state, ActivityState::Tool);
        assert_eq!(record(&engine, "writer").state, ActivityState::Idle);
    }
}
