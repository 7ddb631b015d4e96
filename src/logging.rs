//! Bridge from the event bus into `tracing`.
//!
//! Not installed automatically, for setups that wire their own listeners;
//! attach one per manager to get the standard diagnostics through the
//! subscriber of your choice.

use uuid::Uuid;

use crate::events::{EventBus, EventKind, NetEvent};

/// Forwards DEBUG/INFO/WARNING/ERROR/EXCEPTION events to `tracing`.
pub struct TracingLogger;

impl TracingLogger {
    /// Attaches the bridge; returns the listener owner id, usable with
    /// [`EventBus::ignore_all`] to detach it again.
    pub fn attach(events: &mut EventBus) -> Uuid {
        let owner = Uuid::new_v4();
        events.listen(owner, EventKind::Debug, i32::MAX, |event| {
            if let NetEvent::Debug(message) = event {
                tracing::debug!("{}", message);
            }
        });
        events.listen(owner, EventKind::Info, i32::MAX, |event| {
            if let NetEvent::Info(message) = event {
                tracing::info!("{}", message);
            }
        });
        events.listen(owner, EventKind::Warning, i32::MAX, |event| {
            if let NetEvent::Warning(message) = event {
                tracing::warn!("{}", message);
            }
        });
        events.listen(owner, EventKind::Error, i32::MAX, |event| {
            if let NetEvent::Error(message) = event {
                tracing::error!("{}", message);
            }
        });
        events.listen(owner, EventKind::Exception, i32::MAX, |event| {
            if let NetEvent::Exception { context, detail } = event {
                tracing::error!("{}: {}", context, detail);
            }
        });
        owner
    }
}
