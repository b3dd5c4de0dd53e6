use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, Weak};

use crate::transport::message::Message;

/// Subscribing under this type (or `"all"`) receives every inbound
/// application message, dispatched after type-specific handlers.
pub const WILDCARD: &str = "*";

type Handler = Arc<dyn Fn(&Message) + Send + Sync + 'static>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_kind: HashMap<String, Vec<(u64, Handler)>>,
    wildcard: Vec<(u64, Handler)>,
}

/// Routes inbound frames to type-scoped handler sets plus a wildcard set.
///
/// Handlers for a type run in registration order; a panicking handler is
/// isolated so the remaining handlers still run. Each handler fires exactly
/// once per received message.
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Registers a handler for `kind` (`"*"` or `"all"` for the wildcard
    /// set) and returns a handle that removes exactly this registration.
    pub fn subscribe<F>(&self, kind: &str, handler: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap();
        let id = registry.next_id;
        registry.next_id += 1;

        let handler: Handler = Arc::new(handler);
        let wildcard = kind == WILDCARD || kind == "all";
        if wildcard {
            registry.wildcard.push((id, handler));
        } else {
            registry
                .by_kind
                .entry(kind.to_string())
                .or_default()
                .push((id, handler));
        }

        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind: kind.to_string(),
            wildcard,
            id,
        }
    }

    /// Invokes type-specific handlers in registration order, then wildcard
    /// handlers. Handlers run outside the registry lock, so a handler may
    /// itself subscribe or send.
    pub fn dispatch(&self, msg: &Message) {
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().unwrap();
            let specific = registry
                .by_kind
                .get(&msg.kind)
                .into_iter()
                .flatten()
                .map(|(_, h)| h.clone());
            let wild = registry.wildcard.iter().map(|(_, h)| h.clone());
            specific.chain(wild).collect()
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(msg))).is_err() {
                tracing::warn!(kind = %msg.kind, "subscriber panicked while handling message");
            }
        }
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: &str) -> usize {
        let registry = self.registry.lock().unwrap();
        if kind == WILDCARD || kind == "all" {
            registry.wildcard.len()
        } else {
            registry.by_kind.get(kind).map_or(0, Vec::len)
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its own registration when asked. Calling `unsubscribe` twice is a
/// no-op, and a subscription outliving the dispatcher is harmless.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: String,
    wildcard: bool,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().unwrap();
        if self.wildcard {
            registry.wildcard.retain(|(id, _)| *id != self.id);
        } else if let Some(handlers) = registry.by_kind.get_mut(&self.kind) {
            handlers.retain(|(id, _)| *id != self.id);
            if handlers.is_empty() {
                registry.by_kind.remove(&self.kind);
            }
        }
    }
}
