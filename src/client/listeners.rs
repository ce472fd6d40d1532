use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::metrics::LISTENER_PANICS_TOTAL;

/// Callback invoked with the raw payload of an inbound event
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Token returned by every registration, used to remove that one handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    /// Named helper that owns this listener; at most one per (event, slot)
    slot: Option<&'static str>,
    handler: Handler,
}

/// event name -> handlers, in registration order
pub(crate) struct ListenerRegistry {
    listeners: DashMap<String, Vec<Listener>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a handler alongside any existing ones
    pub fn add(&self, event: &str, handler: Handler) -> ListenerId {
        let id = self.next_id();
        self.listeners.entry(event.to_string()).or_default().push(Listener {
            id,
            slot: None,
            handler,
        });
        id
    }

    /// Install the handler for a named helper, dropping the one it registered before
    pub fn replace_slot(&self, event: &str, slot: &'static str, handler: Handler) -> ListenerId {
        let id = self.next_id();
        let mut entry = self.listeners.entry(event.to_string()).or_default();
        let replaced = entry.len();
        entry.retain(|l| l.slot != Some(slot));
        if entry.len() != replaced {
            tracing::debug!(event = %event, slot = slot, "Replaced listener");
        }
        entry.push(Listener {
            id,
            slot: Some(slot),
            handler,
        });
        id
    }

    /// Remove one handler, or every handler for the event when `id` is `None`.
    /// Returns how many were removed.
    pub fn remove(&self, event: &str, id: Option<ListenerId>) -> usize {
        let removed = match id {
            None => self.listeners.remove(event).map(|(_, l)| l.len()).unwrap_or(0),
            Some(id) => match self.listeners.get_mut(event) {
                Some(mut entry) => {
                    let before = entry.len();
                    entry.retain(|l| l.id != id);
                    before - entry.len()
                }
                None => 0,
            },
        };
        self.listeners.remove_if(event, |_, l| l.is_empty());
        removed
    }

    pub fn clear(&self, event: Option<&str>) {
        match event {
            Some(event) => {
                self.listeners.remove(event);
            }
            None => self.listeners.clear(),
        }
    }

    pub fn count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|l| l.len()).unwrap_or(0)
    }

    /// Invoke every handler for `event`. Handlers run outside the map lock so
    /// they may register or remove listeners themselves. A panicking handler
    /// is logged and skipped. Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &str, data: &Value) -> usize {
        let handlers: Vec<Handler> = match self.listeners.get(event) {
            Some(entry) => entry.iter().map(|l| l.handler.clone()).collect(),
            None => return 0,
        };

        for handler in &handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(data))).is_err() {
                LISTENER_PANICS_TOTAL.inc();
                tracing::error!(event = %event, "Listener panicked");
            }
        }

        handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, Arc::new(move |_: &Value| {
            h.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_generic_listeners_stack() {
        let registry = ListenerRegistry::new();
        let (hits, handler) = counter();

        registry.add("notification", handler.clone());
        registry.add("notification", handler);

        assert_eq!(registry.dispatch("notification", &Value::Null), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_slot_replaces_previous_handler() {
        let registry = ListenerRegistry::new();
        let (first, h1) = counter();
        let (second, h2) = counter();
        let (generic, h3) = counter();

        registry.add("message", h3);
        registry.replace_slot("message", "on_message", h1);
        registry.replace_slot("message", "on_message", h2);

        assert_eq!(registry.count("message"), 2);
        registry.dispatch("message", &Value::Null);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(generic.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_by_id_and_by_event() {
        let registry = ListenerRegistry::new();
        let (_, handler) = counter();

        let a = registry.add("typing", handler.clone());
        registry.add("typing", handler.clone());
        registry.add("user-online", handler);

        assert_eq!(registry.remove("typing", Some(a)), 1);
        assert_eq!(registry.remove("typing", Some(a)), 0);
        assert_eq!(registry.remove("typing", None), 1);
        assert_eq!(registry.count("typing"), 0);

        registry.clear(None);
        assert_eq!(registry.count("user-online"), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let registry = ListenerRegistry::new();
        let (hits, handler) = counter();

        registry.add("task-created", Arc::new(|_: &Value| panic!("boom")));
        registry.add("task-created", handler);

        assert_eq!(registry.dispatch("task-created", &Value::Null), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_can_unregister_itself() {
        let registry = Arc::new(ListenerRegistry::new());
        let r = registry.clone();
        registry.add(
            "model-trained",
            Arc::new(move |_: &Value| {
                r.remove("model-trained", None);
            }),
        );

        registry.dispatch("model-trained", &Value::Null);
        assert_eq!(registry.count("model-trained"), 0);
    }
}
