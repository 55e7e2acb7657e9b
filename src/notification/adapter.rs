//! Notification adapter - routes host hook notifications to registered handlers
//!
//! A failing or panicking handler is logged and counted; it never reaches the
//! caller and never stops the remaining handlers for the same notification.

use super::event::{HookContext, LifecycleEvent, NotificationKind};
use crate::activity::TransitionEngine;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handler invoked with the raw hook payload and its context
pub type NotificationHandler = Arc<dyn Fn(&Value, &HookContext) -> Result<()> + Send + Sync>;

/// Outcome of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub handled: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl DispatchReport {
    pub fn is_ok(&self) -> bool {
        self.failed == 0
    }
}

/// Registry of handlers per notification kind
#[derive(Default)]
pub struct NotificationAdapter {
    handlers: HashMap<NotificationKind, Vec<NotificationHandler>>,
}

impl NotificationAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter with one handler per kind that feeds `engine`
    pub fn for_engine(engine: TransitionEngine, default_agent_id: impl Into<String>) -> Self {
        let default_agent_id: Arc<str> = Arc::from(default_agent_id.into());
        let mut adapter = Self::new();
        for kind in NotificationKind::ALL {
            let engine = engine.clone();
            let default_agent_id = default_agent_id.clone();
            adapter.register(kind, move |payload, context| {
                let event = LifecycleEvent::from_notification(kind, payload, context, &default_agent_id)?;
                engine.apply(&event);
                Ok(())
            });
        }
        adapter
    }

    /// Register a handler for `kind`
    pub fn register<F>(&mut self, kind: NotificationKind, handler: F)
    where
        F: Fn(&Value, &HookContext) -> Result<()> + Send + Sync + 'static,
    {
        debug!(kind = %kind, "Registering notification handler");
        self.handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Run every handler registered for `kind`, in registration order
    pub fn dispatch(&self, kind: NotificationKind, payload: &Value, context: &HookContext) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(handlers) = self.handlers.get(&kind) else {
            debug!(kind = %kind, "No handlers for notification");
            return report;
        };

        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(payload, context)));
            let error = match outcome {
                Ok(Ok(())) => {
                    report.handled += 1;
                    continue;
                }
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
            };
            warn!(kind = %kind, error = %error, "Notification handler failed");
            report.failed += 1;
            report.errors.push(error);
        }

        report
    }

    pub fn handler_count(&self, kind: NotificationKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
