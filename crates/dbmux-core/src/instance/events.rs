//! Lifecycle notifications for instances and the pool.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// The state transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceEventKind {
    /// The pool created a new managed instance.
    Created,
    /// The engine finished booting.
    Initialized,
    /// A holder was granted exclusive access.
    Locked,
    /// The current holder released access.
    Unlocked,
    /// The engine was torn down.
    Closed,
    /// The pool dropped the instance from its set.
    Removed,
}

impl fmt::Display for InstanceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceEventKind::Created => "created",
            InstanceEventKind::Initialized => "initialized",
            InstanceEventKind::Locked => "locked",
            InstanceEventKind::Unlocked => "unlocked",
            InstanceEventKind::Closed => "closed",
            InstanceEventKind::Removed => "removed",
        };
        write!(f, "{}", s)
    }
}

/// A single lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceEvent {
    pub kind: InstanceEventKind,
    pub instance: String,
}

/// Callback invoked for every event.
pub type EventListener = Arc<dyn Fn(&InstanceEvent) + Send + Sync>;

/// Registered observers, shared between a pool and its instances.
///
/// Listeners are called synchronously on the emitting task, after the
/// emitting state transition has completed and its locks are released. They
/// must not block.
#[derive(Clone, Default)]
pub struct EventListeners {
    listeners: Arc<RwLock<Vec<EventListener>>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer.
    pub fn register<F>(&self, listener: F)
    where
        F: Fn(&InstanceEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every observer.
    pub fn emit(&self, kind: InstanceEventKind, instance: &str) {
        let event = InstanceEvent {
            kind,
            instance: instance.to_string(),
        };
        debug!("Instance {} {}", event.instance, event.kind);

        // Snapshot so observers may register further observers
        let snapshot: Vec<EventListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in snapshot {
            listener(&event);
        }
    }
}

impl fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("count", &self.len())
            .finish()
    }
}
