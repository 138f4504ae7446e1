//! In-process event dispatcher.
//!
//! Audit and consent services publish named events here; any interested
//! listener (workflow triggers, notifications, tests) subscribes by name or
//! to everything.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A named notification with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    by_name: HashMap<String, Vec<Listener>>,
    wildcard: Vec<Listener>,
}

/// Synchronous fan-out of [`Event`]s to registered listeners.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Listeners>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events named `name`.
    pub fn listen<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut guard = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .by_name
            .entry(name.into())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Subscribe to every event.
    pub fn listen_all<F>(&self, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut guard = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        guard.wildcard.push(Arc::new(listener));
    }

    /// Deliver `event` to its named listeners, then wildcard listeners.
    ///
    /// Returns how many listeners were notified. Listeners run outside the
    /// registry lock so they may subscribe further listeners.
    pub fn dispatch(&self, event: &Event) -> usize {
        let targets: Vec<Listener> = {
            let guard = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            guard
                .by_name
                .get(&event.name)
                .into_iter()
                .flatten()
                .chain(guard.wildcard.iter())
                .cloned()
                .collect()
        };
        for listener in &targets {
            listener(event);
        }
        tracing::trace!(event = %event.name, listeners = targets.len(), "event dispatched");
        targets.len()
    }

    /// Number of listeners subscribed to `name` specifically.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        let guard = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        guard.by_name.get(name).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventDispatcher")
            .field("named", &guard.by_name.len())
            .field("wildcard", &guard.wildcard.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn named_and_wildcard_listeners_receive_events() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let named = Arc::clone(&seen);
        dispatcher.listen("consent.accepted", move |e| {
            named.lock().unwrap().push(format!("named:{}", e.name));
        });
        let all = Arc::clone(&seen);
        dispatcher.listen_all(move |e| {
            all.lock().unwrap().push(format!("all:{}", e.name));
        });

        assert_eq!(dispatcher.dispatch(&Event::new("consent.accepted", json!({}))), 2);
        assert_eq!(dispatcher.dispatch(&Event::new("consent.revoked", json!({}))), 1);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "named:consent.accepted",
                "all:consent.accepted",
                "all:consent.revoked"
            ]
        );
        assert_eq!(dispatcher.listener_count("consent.accepted"), 1);
        assert_eq!(dispatcher.listener_count("consent.revoked"), 0);
    }

    #[test]
    fn dispatch_without_listeners_is_a_no_op() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.dispatch(&Event::new("nothing", json!(null))), 0);
    }
}
