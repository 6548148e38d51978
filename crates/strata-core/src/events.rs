//! Event registration and synchronous notification.
//!
//! An event registry lives inside the store it serves, as the private
//! `_events` data property. The registry is itself a property store in which
//! every registered event name is bound to its slot: an optional transmitter
//! and the ordered list of listeners.
//!
//! Firing takes a snapshot of the listener list before invoking anything,
//! so listeners may connect or disconnect (themselves included) while the
//! event is being delivered.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StrataError};
use crate::properties::Properties;
use crate::value::Value;

/// Name of the private property holding a store's event registry.
pub const EVENTS_PROPERTY: &str = "_events";

/// Fired by a store with an initialized registry whenever a property is set
/// or cleared. The single argument is the property name.
pub const PROPERTY_CHANGED: &str = "property-changed";

/// A listener receives the firing store and the event arguments.
pub type Listener = Arc<dyn Fn(&Properties, &[Value]) + Send + Sync>;

/// A transmitter adapts the argument list before it reaches a listener.
pub type Transmitter = Arc<dyn Fn(&Listener, &Properties, &[Value]) + Send + Sync>;

/// Stable identity of a connected listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventHandle {
    event: String,
    id: u64,
}

impl EventHandle {
    pub fn event(&self) -> &str {
        &self.event
    }
}

struct Connection {
    id: u64,
    listener: Listener,
    blocked: AtomicBool,
    connected: AtomicBool,
}

struct EventSlot {
    transmitter: Option<Transmitter>,
    connections: Mutex<Vec<Arc<Connection>>>,
}

/// The event registry of one store.
pub struct Events {
    slots: Properties,
    next_id: AtomicU64,
}

impl Events {
    fn new() -> Self {
        Self {
            slots: Properties::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn slot(&self, name: &str) -> Option<Arc<EventSlot>> {
        self.slots.get_data::<EventSlot>(name)
    }

    /// Register `name`. Registering an existing event keeps its listeners.
    pub fn register(&self, name: &str, transmitter: Option<Transmitter>) -> Result<()> {
        if self.slot(name).is_some() {
            return Ok(());
        }
        self.slots.set_data(
            name,
            EventSlot {
                transmitter,
                connections: Mutex::new(Vec::new()),
            },
            0,
        )
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }

    /// Append a listener to `name`'s list.
    pub fn listen(&self, name: &str, listener: Listener) -> Result<EventHandle> {
        let slot = self
            .slot(name)
            .ok_or_else(|| StrataError::UnknownEvent(name.to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        slot.connections.lock().push(Arc::new(Connection {
            id,
            listener,
            blocked: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }));
        Ok(EventHandle {
            event: name.to_string(),
            id,
        })
    }

    fn find(&self, handle: &EventHandle) -> Option<Arc<Connection>> {
        let slot = self.slot(&handle.event)?;
        let connections = slot.connections.lock();
        connections.iter().find(|c| c.id == handle.id).cloned()
    }

    /// Suspend delivery to one listener without losing its place.
    pub fn block(&self, handle: &EventHandle) -> bool {
        self.find(handle)
            .map(|c| c.blocked.store(true, Ordering::SeqCst))
            .is_some()
    }

    pub fn unblock(&self, handle: &EventHandle) -> bool {
        self.find(handle)
            .map(|c| c.blocked.store(false, Ordering::SeqCst))
            .is_some()
    }

    /// Remove one listener. Returns false if it was already gone.
    pub fn disconnect(&self, handle: &EventHandle) -> bool {
        let Some(slot) = self.slot(&handle.event) else {
            return false;
        };
        let mut connections = slot.connections.lock();
        let before = connections.len();
        connections.retain(|c| {
            if c.id == handle.id {
                c.connected.store(false, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
        before != connections.len()
    }

    /// Number of listeners connected to `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.slot(name)
            .map(|slot| slot.connections.lock().len())
            .unwrap_or(0)
    }

    /// Deliver `args` to every unblocked listener of `name`, in connection
    /// order. Returns the number of listeners invoked.
    pub fn fire(&self, owner: &Properties, name: &str, args: &[Value]) -> usize {
        let Some(slot) = self.slot(name) else {
            return 0;
        };
        let snapshot: Vec<Arc<Connection>> = slot.connections.lock().clone();
        let mut invoked = 0;
        for connection in snapshot {
            if !connection.connected.load(Ordering::SeqCst)
                || connection.blocked.load(Ordering::SeqCst)
            {
                continue;
            }
            match &slot.transmitter {
                Some(transmit) => transmit(&connection.listener, owner, args),
                None => (connection.listener)(owner, args),
            }
            invoked += 1;
        }
        invoked
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events")
            .field("events", &self.slots.names())
            .finish()
    }
}

impl Properties {
    /// Create this store's event registry (idempotent) and register
    /// `property-changed`.
    pub fn init_events(&self) -> Arc<Events> {
        if let Some(events) = self.events() {
            return events;
        }
        let events = Arc::new(Events::new());
        // Registering a fresh event cannot fail: the name is non-empty.
        let _ = events.register(PROPERTY_CHANGED, None);
        let _ = self.set_shared_data(EVENTS_PROPERTY, Arc::clone(&events), 0);
        events
    }

    pub fn register_event(&self, name: &str) -> Result<()> {
        self.init_events().register(name, None)
    }

    pub fn register_event_with(&self, name: &str, transmitter: Transmitter) -> Result<()> {
        self.init_events().register(name, Some(transmitter))
    }

    /// Connect a listener to a registered event.
    pub fn listen<F>(&self, name: &str, listener: F) -> Result<EventHandle>
    where
        F: Fn(&Properties, &[Value]) + Send + Sync + 'static,
    {
        let events = self
            .events()
            .ok_or_else(|| StrataError::UnknownEvent(name.to_string()))?;
        events.listen(name, Arc::new(listener))
    }

    /// Fire `name` on this store. Stores without a registry fire nothing.
    pub fn fire(&self, name: &str, args: &[Value]) -> usize {
        match self.events() {
            Some(events) => events.fire(self, name, args),
            None => 0,
        }
    }

    pub fn block_listener(&self, handle: &EventHandle) -> bool {
        self.events().map(|e| e.block(handle)).unwrap_or(false)
    }

    pub fn unblock_listener(&self, handle: &EventHandle) -> bool {
        self.events().map(|e| e.unblock(handle)).unwrap_or(false)
    }

    pub fn disconnect(&self, handle: &EventHandle) -> bool {
        self.events().map(|e| e.disconnect(handle)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn test_listener_receives_argument_once() {
        let store = Properties::new();
        store.register_event("changed").unwrap();

        let calls = Arc::new(AtomicU64::new(0));
        let seen = Arc::new(AtomicI64::new(0));
        let (c, s) = (calls.clone(), seen.clone());
        let handle = store
            .listen("changed", move |_, args| {
                c.fetch_add(1, Ordering::SeqCst);
                s.store(args[0].as_int64(), Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(store.fire("changed", &[Value::Int(42)]), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 42);

        assert!(store.disconnect(&handle));
        assert_eq!(store.fire("changed", &[Value::Int(7)]), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!store.disconnect(&handle));
    }

    #[test]
    fn test_registration_order() {
        let store = Properties::new();
        store.register_event("tick").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            store
                .listen("tick", move |_, _| order.lock().push(i))
                .unwrap();
        }
        store.fire("tick", &[]);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unknown_event_rejected() {
        let store = Properties::new();
        assert!(matches!(
            store.listen("nope", |_, _| {}),
            Err(StrataError::UnknownEvent(_))
        ));
        store.init_events();
        assert!(store.listen("nope", |_, _| {}).is_err());
        assert_eq!(store.fire("nope", &[]), 0);
    }

    #[test]
    fn test_block_and_unblock() {
        let store = Properties::new();
        store.register_event("e").unwrap();
        let calls = Arc::new(AtomicU64::new(0));
        let c = calls.clone();
        let handle = store
            .listen("e", move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(store.block_listener(&handle));
        store.fire("e", &[]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.unblock_listener(&handle));
        store.fire("e", &[]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_property_changed_fires_with_name() {
        let store = Properties::new();
        store.init_events();
        let names = Arc::new(Mutex::new(Vec::new()));
        let n = names.clone();
        store
            .listen(PROPERTY_CHANGED, move |_, args| {
                if let Some(name) = args.first().and_then(|a| a.as_string()) {
                    n.lock().push(name);
                }
            })
            .unwrap();
        store.set("width", "720").unwrap();
        store.set_int("height", 576).unwrap();
        store.clear("width").unwrap();
        assert_eq!(*names.lock(), vec!["width", "height", "width"]);
    }

    #[test]
    fn test_listener_may_disconnect_during_fire() {
        let store = Properties::new();
        store.register_event("e").unwrap();
        let slot: Arc<Mutex<Option<EventHandle>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let (s, c) = (slot.clone(), calls.clone());
        let first = store
            .listen("e", move |owner, _| {
                c.fetch_add(1, Ordering::SeqCst);
                if let Some(h) = s.lock().take() {
                    owner.disconnect(&h);
                }
            })
            .unwrap();
        let c2 = calls.clone();
        store
            .listen("e", move |_, _| {
                c2.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        *slot.lock() = Some(first);

        assert_eq!(store.fire("e", &[]), 2);
        assert_eq!(store.events().unwrap().listener_count("e"), 1);
        assert_eq!(store.fire("e", &[]), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_transmitter_adapts_arguments() {
        let store = Properties::new();
        let doubled: Transmitter = Arc::new(|listener: &Listener, owner: &Properties, args: &[Value]| {
            let adapted: Vec<Value> = args.iter().map(|a| Value::Int(a.as_int() * 2)).collect();
            listener(owner, &adapted)
        });
        store.register_event_with("scaled", doubled).unwrap();
        let seen = Arc::new(AtomicI64::new(0));
        let s = seen.clone();
        store
            .listen("scaled", move |_, args| {
                s.store(args[0].as_int64(), Ordering::SeqCst)
            })
            .unwrap();
        store.fire("scaled", &[Value::Int(21)]);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
