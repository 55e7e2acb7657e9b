//! Notification layer - the boundary between host lifecycle hooks and the tracker
//!
//! # Usage
//! ```ignore
//! use lobster_room::notification::{HookContext, NotificationAdapter, NotificationKind};
//!
//! let adapter = NotificationAdapter::for_engine(tracker.engine().clone(), "main");
//! adapter.dispatch(NotificationKind::ToolCallBegin, &payload, &HookContext::default());
//! ```

pub mod adapter;
pub mod event;

pub use adapter::{DispatchReport, NotificationAdapter, NotificationHandler};
pub use event::{HookContext, LifecycleEvent, NotificationKind, SessionContext};
