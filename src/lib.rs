//! Lobster Room - agent activity tracker
//!
//! Turns host lifecycle notifications into a per-agent presence state with
//! debounced idle transitions and watchdog recovery, and serves it as JSON.

pub mod activity;
pub mod clock;
pub mod config;
pub mod notification;
pub mod server;

pub use activity::{ActivityRecord, ActivityState, ActivityTracker, AgentView, SnapshotResponse, TransitionEngine, UiState};
pub use clock::{Clock, TokioClock};
pub use config::{ActivityConfig, ActivityTimings, ServerConfig};
pub use notification::{DispatchReport, HookContext, LifecycleEvent, NotificationAdapter, NotificationKind};
