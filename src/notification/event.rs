//! Lifecycle notifications
//!
//! Host hook payloads are loosely shaped JSON. They are turned into a closed
//! `LifecycleEvent` here, before anything reaches the transition engine:
//! optional fields may be absent and a missing agent id falls back to the
//! hook context, then to the configured default.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Kinds of lifecycle notification the tracker understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    AgentStart,
    ToolCallBegin,
    ToolCallEnd,
    /// Backup for `ToolCallEnd`; some host paths only emit this one
    ToolResultRecorded,
    MessageSendBegin,
    MessageSendComplete,
    AgentRunComplete,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 7] = [
        NotificationKind::AgentStart,
        NotificationKind::ToolCallBegin,
        NotificationKind::ToolCallEnd,
        NotificationKind::ToolResultRecorded,
        NotificationKind::MessageSendBegin,
        NotificationKind::MessageSendComplete,
        NotificationKind::AgentRunComplete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::AgentStart => "agent-start",
            NotificationKind::ToolCallBegin => "tool-call-begin",
            NotificationKind::ToolCallEnd => "tool-call-end",
            NotificationKind::ToolResultRecorded => "tool-result-recorded",
            NotificationKind::MessageSendBegin => "message-send-begin",
            NotificationKind::MessageSendComplete => "message-send-complete",
            NotificationKind::AgentRunComplete => "agent-run-complete",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the canonical names as well as the gateway plugin hook names
/// (`before_tool_call`, `tool_result_persist`, `agent_end`, ...).
impl FromStr for NotificationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let kind = match normalized.as_str() {
            "agent-start" | "before-agent-start" => NotificationKind::AgentStart,
            "tool-call-begin" | "before-tool-call" => NotificationKind::ToolCallBegin,
            "tool-call-end" | "after-tool-call" => NotificationKind::ToolCallEnd,
            "tool-result-recorded" | "tool-result-persist" => NotificationKind::ToolResultRecorded,
            "message-send-begin" | "message-sending" => NotificationKind::MessageSendBegin,
            "message-send-complete" | "message-sent" => NotificationKind::MessageSendComplete,
            "agent-run-complete" | "agent-end" => NotificationKind::AgentRunComplete,
            _ => bail!("unknown notification kind: {}", s),
        };
        Ok(kind)
    }
}

/// Context the host passes next to each hook payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookContext {
    pub agent_id: Option<String>,
    pub session_key: Option<String>,
    pub channel_id: Option<String>,
}

impl HookContext {
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Self::default()
        }
    }
}

/// Session/channel context carried into record details
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionContext {
    pub session_key: Option<String>,
    pub channel: Option<String>,
}

impl SessionContext {
    /// Details object with the known context fields
    pub fn to_details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        if let Some(key) = &self.session_key {
            details.insert("sessionKey".into(), Value::String(key.clone()));
        }
        if let Some(channel) = &self.channel {
            details.insert("channel".into(), Value::String(channel.clone()));
        }
        details
    }
}

/// A lifecycle notification after boundary validation
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    AgentStart {
        agent_id: String,
        session: SessionContext,
    },
    ToolCallBegin {
        agent_id: String,
        tool_name: Option<String>,
        session: SessionContext,
    },
    ToolCallEnd {
        agent_id: String,
        session: SessionContext,
    },
    ToolResultRecorded {
        agent_id: String,
        session: SessionContext,
    },
    MessageSendBegin {
        agent_id: String,
        target: Option<String>,
        session: SessionContext,
    },
    MessageSendComplete {
        agent_id: String,
    },
    AgentRunComplete {
        agent_id: String,
        success: bool,
        error: Option<String>,
    },
}

/// Raw hook payload; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawNotification {
    agent_id: Option<String>,
    session_key: Option<String>,
    #[serde(alias = "channelId")]
    channel: Option<String>,
    #[serde(alias = "tool")]
    tool_name: Option<String>,
    #[serde(alias = "to")]
    target: Option<String>,
    success: Option<bool>,
    error: Option<Value>,
}

impl LifecycleEvent {
    /// Build an event from a hook payload
    ///
    /// Fails only when the payload is not an object or a known field has the
    /// wrong type; absent fields are fine.
    pub fn from_notification(
        kind: NotificationKind,
        payload: &Value,
        context: &HookContext,
        default_agent_id: &str,
    ) -> Result<Self> {
        let raw: RawNotification = match payload {
            Value::Null => RawNotification::default(),
            Value::Object(_) => serde_json::from_value(payload.clone())
                .with_context(|| format!("malformed {} payload", kind))?,
            other => bail!("{} payload must be an object, got {}", kind, json_type(other)),
        };

        let agent_id = non_empty(raw.agent_id)
            .or_else(|| non_empty(context.agent_id.clone()))
            .unwrap_or_else(|| default_agent_id.to_string());
        let session = SessionContext {
            session_key: non_empty(raw.session_key).or_else(|| non_empty(context.session_key.clone())),
            channel: non_empty(raw.channel).or_else(|| non_empty(context.channel_id.clone())),
        };

        let event = match kind {
            NotificationKind::AgentStart => LifecycleEvent::AgentStart { agent_id, session },
            NotificationKind::ToolCallBegin => LifecycleEvent::ToolCallBegin {
                agent_id,
                tool_name: non_empty(raw.tool_name),
                session,
            },
            NotificationKind::ToolCallEnd => LifecycleEvent::ToolCallEnd { agent_id, session },
            NotificationKind::ToolResultRecorded => {
                LifecycleEvent::ToolResultRecorded { agent_id, session }
            }
            NotificationKind::MessageSendBegin => LifecycleEvent::MessageSendBegin {
                agent_id,
                target: non_empty(raw.target),
                session,
            },
            NotificationKind::MessageSendComplete => LifecycleEvent::MessageSendComplete { agent_id },
            NotificationKind::AgentRunComplete => {
                let error = raw.error.as_ref().and_then(error_text);
                LifecycleEvent::AgentRunComplete {
                    agent_id,
                    success: raw.success.unwrap_or(error.is_none()),
                    error,
                }
            }
        };
        Ok(event)
    }

    pub fn agent_id(&self) -> &str {
        match self {
            LifecycleEvent::AgentStart { agent_id, .. }
            | LifecycleEvent::ToolCallBegin { agent_id, .. }
            | LifecycleEvent::ToolCallEnd { agent_id, .. }
            | LifecycleEvent::ToolResultRecorded { agent_id, .. }
            | LifecycleEvent::MessageSendBegin { agent_id, .. }
            | LifecycleEvent::MessageSendComplete { agent_id }
            | LifecycleEvent::AgentRunComplete { agent_id, .. } => agent_id,
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            LifecycleEvent::AgentStart { .. } => NotificationKind::AgentStart,
            LifecycleEvent::ToolCallBegin { .. } => NotificationKind::ToolCallBegin,
            LifecycleEvent::ToolCallEnd { .. } => NotificationKind::ToolCallEnd,
            LifecycleEvent::ToolResultRecorded { .. } => NotificationKind::ToolResultRecorded,
            LifecycleEvent::MessageSendBegin { .. } => NotificationKind::MessageSendBegin,
            LifecycleEvent::MessageSendComplete { .. } => NotificationKind::MessageSendComplete,
            LifecycleEvent::AgentRunComplete { .. } => NotificationKind::AgentRunComplete,
        }
    }
}

/// Convenience constructors
impl LifecycleEvent {
    pub fn agent_start(agent_id: impl Into<String>) -> Self {
        LifecycleEvent::AgentStart {
            agent_id: agent_id.into(),
            session: SessionContext::default(),
        }
    }

    pub fn tool_call_begin(agent_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        LifecycleEvent::ToolCallBegin {
            agent_id: agent_id.into(),
            tool_name: Some(tool_name.into()),
            session: SessionContext::default(),
        }
    }

    pub fn tool_call_end(agent_id: impl Into<String>) -> Self {
        LifecycleEvent::ToolCallEnd {
            agent_id: agent_id.into(),
            session: SessionContext::default(),
        }
    }

    pub fn message_send_begin(agent_id: impl Into<String>, channel: impl Into<String>) -> Self {
        LifecycleEvent::MessageSendBegin {
            agent_id: agent_id.into(),
            target: None,
            session: SessionContext {
                session_key: None,
                channel: Some(channel.into()),
            },
        }
    }

    pub fn message_send_complete(agent_id: impl Into<String>) -> Self {
        LifecycleEvent::MessageSendComplete {
            agent_id: agent_id.into(),
        }
    }

    pub fn run_succeeded(agent_id: impl Into<String>) -> Self {
        LifecycleEvent::AgentRunComplete {
            agent_id: agent_id.into(),
            success: true,
            error: None,
        }
    }

    pub fn run_failed(agent_id: impl Into<String>, error: impl Into<String>) -> Self {
        LifecycleEvent::AgentRunComplete {
            agent_id: agent_id.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Error text from a string, `{message}` object or any other JSON value
fn error_text(error: &Value) -> Option<String> {
    match error {
        Value::Null => None,
        Value::String(s) => non_empty(Some(s.clone())),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) => Some(message.clone()),
            _ => Some(error.to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
