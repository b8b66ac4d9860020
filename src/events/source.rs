//! Event sources and subscription handles

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::{Event, EventKind};

/// What a listener wants after seeing an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep receiving events
    Continue,
    /// Remove this listener
    Done,
}

type Listener = Box<dyn FnMut(&Event) -> Flow + Send>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(u64, Listener)>>,
    closed: bool,
}

/// A named emitter of events
///
/// Listeners only see events emitted after they subscribe; nothing is
/// buffered for late subscribers. Listeners run synchronously inside
/// [`EventSource::emit`] while the registry is locked, so they must not
/// subscribe to or emit on the same source.
#[derive(Clone)]
pub struct EventSource {
    name: Arc<str>,
    registry: Arc<Mutex<Registry>>,
}

impl EventSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a listener for `kind`
    ///
    /// The listener is attached before this returns. On a closed source the
    /// listener is dropped immediately and the handle is inert.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: FnMut(&Event) -> Flow + Send + 'static,
    {
        let mut registry = self.registry.lock();
        if registry.closed {
            return Subscription {
                registry: Weak::new(),
                kind,
                id: 0,
            };
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(listener)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    /// Deliver `event` to every listener registered for `kind`
    pub fn emit(&self, kind: EventKind, event: &Event) {
        let mut registry = self.registry.lock();
        if let Some(list) = registry.listeners.get_mut(&kind) {
            trace!(source = %self.name, ?kind, listeners = list.len(), "emit");
            list.retain_mut(|(_, listener)| listener(event) == Flow::Continue);
            if list.is_empty() {
                registry.listeners.remove(&kind);
            }
        }
    }

    /// Deliver `event` under its primary kind
    pub fn emit_event(&self, event: &Event) {
        self.emit(event.kind(), event);
    }

    /// Number of live listeners for `kind`
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .listeners
            .get(&kind)
            .map_or(0, |list| list.len())
    }

    /// Drop every listener and refuse new ones
    ///
    /// Pending waits observe the closure as `SourceClosed`.
    pub fn close(&self) {
        let dropped = {
            let mut registry = self.registry.lock();
            registry.closed = true;
            std::mem::take(&mut registry.listeners)
        };
        drop(dropped);
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Handle to a registered listener
///
/// Dropping the handle unregisters the listener if it is still attached.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Whether the listener is still attached to its source
    pub fn is_active(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let registry = registry.lock();
        registry
            .listeners
            .get(&self.kind)
            .is_some_and(|list| list.iter().any(|(id, _)| *id == self.id))
    }

    /// Detach the listener; returns false if it was already gone
    pub fn unregister(&mut self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        self.registry = Weak::new();

        let removed = {
            let mut registry = registry.lock();
            let Some(list) = registry.listeners.get_mut(&self.kind) else {
                return false;
            };
            let removed = list
                .iter()
                .position(|(id, _)| *id == self.id)
                .map(|index| list.remove(index));
            if list.is_empty() {
                registry.listeners.remove(&self.kind);
            }
            removed
        };
        removed.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}
