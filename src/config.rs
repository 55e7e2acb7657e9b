//! Configuration - env-first settings for the tracker and the HTTP host
//!
//! Every value has a default. Malformed values are logged and ignored, never fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_AGENT_ID: &str = "main";
pub const DEFAULT_COOLDOWN_MS: u64 = 1_500;
pub const DEFAULT_STALE_MS: u64 = 15_000;
pub const DEFAULT_TOOL_MAX_MS: u64 = 12_000;
pub const DEFAULT_POLL_SECONDS: u64 = 2;
pub const DEFAULT_PORT: u16 = 8080;

/// Watchdog and cooldown delays, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTimings {
    /// Debounce before an idle transition is committed
    pub cooldown_ms: u64,
    /// Silence after which an active agent is forced idle
    pub stale_ms: u64,
    /// Longest a single tool call may hold the `tool` state
    pub tool_max_ms: u64,
}

impl ActivityTimings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn stale(&self) -> Duration {
        Duration::from_millis(self.stale_ms)
    }

    pub fn tool_max(&self) -> Duration {
        Duration::from_millis(self.tool_max_ms)
    }
}

impl Default for ActivityTimings {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            stale_ms: DEFAULT_STALE_MS,
            tool_max_ms: DEFAULT_TOOL_MAX_MS,
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityConfig {
    /// Agent id used when a notification carries none
    pub default_agent_id: String,
    /// Agents reported by the snapshot; empty means just the default agent
    pub agents: Vec<String>,
    /// Display-name overrides (agent id -> name)
    pub display_names: BTreeMap<String, String>,
    /// Identity names known from the host configuration (agent id -> name)
    pub identities: BTreeMap<String, String>,
    pub timings: ActivityTimings,
    /// Poll interval advertised to snapshot consumers
    pub poll_seconds: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            default_agent_id: DEFAULT_AGENT_ID.to_string(),
            agents: Vec::new(),
            display_names: BTreeMap::new(),
            identities: BTreeMap::new(),
            timings: ActivityTimings::default(),
            poll_seconds: DEFAULT_POLL_SECONDS,
        }
    }
}

impl ActivityConfig {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `LOBSTER_ROOM_AGENT_ID` | default agent id |
    /// | `LOBSTER_ROOM_AGENTS` | comma-separated allow-list |
    /// | `LOBSTER_ROOM_AGENT_NAMES_JSON` | `{"id": "name"}` overrides |
    /// | `LOBSTER_ROOM_IDENTITIES_JSON` | `{"id": "name"}` identity names |
    /// | `LOBSTER_ROOM_COOLDOWN_MS` / `_STALE_MS` / `_TOOL_MAX_MS` | delays |
    /// | `LOBSTER_ROOM_POLL_SECONDS` | advertised poll interval (min 1) |
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = ActivityTimings::default();
        let default_agent_id = get("LOBSTER_ROOM_AGENT_ID").unwrap_or_else(|| DEFAULT_AGENT_ID.to_string());
        let agents = get("LOBSTER_ROOM_AGENTS")
            .map(|raw| parse_agent_list(&raw))
            .unwrap_or_default();
        let display_names = get("LOBSTER_ROOM_AGENT_NAMES_JSON")
            .map(|raw| parse_name_map("LOBSTER_ROOM_AGENT_NAMES_JSON", &raw))
            .unwrap_or_default();
        let identities = get("LOBSTER_ROOM_IDENTITIES_JSON")
            .map(|raw| parse_name_map("LOBSTER_ROOM_IDENTITIES_JSON", &raw))
            .unwrap_or_default();

        let timings = ActivityTimings {
            cooldown_ms: parse_non_negative("LOBSTER_ROOM_COOLDOWN_MS", get("LOBSTER_ROOM_COOLDOWN_MS"), defaults.cooldown_ms),
            stale_ms: parse_non_negative("LOBSTER_ROOM_STALE_MS", get("LOBSTER_ROOM_STALE_MS"), defaults.stale_ms),
            tool_max_ms: parse_non_negative("LOBSTER_ROOM_TOOL_MAX_MS", get("LOBSTER_ROOM_TOOL_MAX_MS"), defaults.tool_max_ms),
        };
        let poll_seconds = parse_non_negative(
            "LOBSTER_ROOM_POLL_SECONDS",
            get("LOBSTER_ROOM_POLL_SECONDS"),
            DEFAULT_POLL_SECONDS,
        )
        .max(1);

        Self {
            default_agent_id,
            agents,
            display_names,
            identities,
            timings,
            poll_seconds,
        }
    }

    /// Agents the snapshot reports, in configured order
    pub fn allowed_agents(&self) -> Vec<String> {
        if self.agents.is_empty() {
            vec![self.default_agent_id.clone()]
        } else {
            self.agents.clone()
        }
    }
}

/// Listen address for the HTTP host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `PORT` wins over `DASHBOARD_PORT`. Without `DASHBOARD_BIND` the server
    /// binds all interfaces when `PORT` is set (hosted) and loopback otherwise.
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let hosted_port = lookup("PORT").filter(|v| !v.trim().is_empty());
        let hosted = hosted_port.is_some();
        let port = hosted_port
            .or_else(|| lookup("DASHBOARD_PORT"))
            .and_then(|raw| match raw.trim().parse::<u16>() {
                Ok(port) => Some(port),
                Err(e) => {
                    warn!(value = %raw, error = %e, "Ignoring invalid port");
                    None
                }
            })
            .unwrap_or(DEFAULT_PORT);
        let bind = lookup("DASHBOARD_BIND")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| (if hosted { "0.0.0.0" } else { "127.0.0.1" }).to_string());

        Self { bind, port }
    }
}

fn parse_agent_list(raw: &str) -> Vec<String> {
    let mut agents: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !agents.iter().any(|a| a == id) {
            agents.push(id.to_string());
        }
    }
    agents
}

fn parse_name_map(key: &str, raw: &str) -> BTreeMap<String, String> {
    let parsed = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(key, "Ignoring name map: expected a JSON object");
            return BTreeMap::new();
        }
        Err(e) => {
            warn!(key, error = %e, "Ignoring malformed name map");
            return BTreeMap::new();
        }
    };

    parsed
        .into_iter()
        .filter_map(|(id, name)| match name {
            Value::String(name) if !name.trim().is_empty() => Some((id, name.trim().to_string())),
            _ => None,
        })
        .collect()
}

fn parse_non_negative(key: &str, raw: Option<String>, default: u64) -> u64 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<i64>() {
        Ok(value) => value.max(0) as u64,
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring invalid number");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = ActivityConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, ActivityConfig::default());
        assert_eq!(config.allowed_agents(), vec!["main".to_string()]);
        assert_eq!(config.timings.cooldown_ms, 1_500);
        assert_eq!(config.timings.stale_ms, 15_000);
        assert_eq!(config.timings.tool_max_ms, 12_000);
    }

    #[test]
    fn test_reads_agents_and_names() {
        let config = ActivityConfig::from_lookup(lookup_from(&[
            ("LOBSTER_ROOM_AGENT_ID", "primary"),
            ("LOBSTER_ROOM_AGENTS", "primary, writer,,primary"),
            ("LOBSTER_ROOM_AGENT_NAMES_JSON", r#"{"writer": "Scribe", "bad": 3}"#),
            ("LOBSTER_ROOM_IDENTITIES_JSON", r#"{"primary": "Lobster"}"#),
        ]));

        assert_eq!(config.default_agent_id, "primary");
        assert_eq!(config.allowed_agents(), vec!["primary".to_string(), "writer".to_string()]);
        assert_eq!(config.display_names.get("writer").map(String::as_str), Some("Scribe"));
        assert!(!config.display_names.contains_key("bad"));
        assert_eq!(config.identities.get("primary").map(String::as_str), Some("Lobster"));
    }

    #[test]
    fn test_malformed_name_map_is_ignored() {
        let config = ActivityConfig::from_lookup(lookup_from(&[
            ("LOBSTER_ROOM_AGENT_NAMES_JSON", "{not json"),
            ("LOBSTER_ROOM_IDENTITIES_JSON", r#"["a", "b"]"#),
        ]));
        assert!(config.display_names.is_empty());
        assert!(config.identities.is_empty());
    }

    #[test]
    fn test_timings_fall_back_on_invalid_numbers() {
        let config = ActivityConfig::from_lookup(lookup_from(&[
            ("LOBSTER_ROOM_COOLDOWN_MS", "fast"),
            ("LOBSTER_ROOM_STALE_MS", "200"),
            ("LOBSTER_ROOM_TOOL_MAX_MS", "-5"),
            ("LOBSTER_ROOM_POLL_SECONDS", "0"),
        ]));
        assert_eq!(config.timings.cooldown_ms, 1_500);
        assert_eq!(config.timings.stale_ms, 200);
        assert_eq!(config.timings.tool_max_ms, 0);
        assert_eq!(config.poll_seconds, 1);
    }

    #[test]
    fn test_server_config_local_default() {
        let server = ServerConfig::from_lookup(lookup_from(&[]));
        assert_eq!(server, ServerConfig { bind: "127.0.0.1".into(), port: 8080 });
    }

    #[test]
    fn test_server_config_hosted_port_binds_all_interfaces() {
        let server = ServerConfig::from_lookup(lookup_from(&[("PORT", "9000"), ("DASHBOARD_PORT", "7000")]));
        assert_eq!(server, ServerConfig { bind: "0.0.0.0".into(), port: 9000 });
    }

    #[test]
    fn test_server_config_explicit_bind_wins() {
        let server = ServerConfig::from_lookup(lookup_from(&[
            ("DASHBOARD_PORT", "7000"),
            ("DASHBOARD_BIND", "10.0.0.2"),
        ]));
        assert_eq!(server, ServerConfig { bind: "10.0.0.2".into(), port: 7000 });
    }
}
