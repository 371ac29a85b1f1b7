//! Ordered callback registry behind the `on_*` registration methods.
//!
//! Callbacks are grouped by [`EventKind`] and invoked in registration order.
//! Every registration hands back a [`Subscription`]; dropping it removes
//! exactly that callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;
use tracing::debug;

use crate::presence::PresenceList;
use crate::protocol::InboundEvent;

/// Callback receiving an event payload.
pub type PayloadCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback receiving a presence roster snapshot.
pub type PresenceCallback = Arc<dyn Fn(&PresenceList) + Send + Sync>;

/// The twelve kinds of notification a session fans out to callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DrawingStart,
    DrawingMove,
    DrawingStop,
    ChatMessage,
    PresenceUpdate,
    JoinSuccess,
    JoinError,
    GameStarted,
    GameEnded,
    RoundStarted,
    RoundEnded,
    TurnChanged,
}

impl From<InboundEvent> for EventKind {
    fn from(event: InboundEvent) -> Self {
        match event {
            InboundEvent::DrawingStart => Self::DrawingStart,
            InboundEvent::DrawingMove => Self::DrawingMove,
            InboundEvent::DrawingStop => Self::DrawingStop,
            InboundEvent::ChatMessage => Self::ChatMessage,
            InboundEvent::GameStarted => Self::GameStarted,
            InboundEvent::GameEnded => Self::GameEnded,
            InboundEvent::RoundStarted => Self::RoundStarted,
            InboundEvent::RoundEnded => Self::RoundEnded,
            InboundEvent::TurnChanged => Self::TurnChanged,
        }
    }
}

#[derive(Clone)]
enum Callback {
    Payload(PayloadCallback),
    Presence(PresenceCallback),
}

struct Entry {
    id: u64,
    callback: Callback,
}

/// Callback table shared between a session handle and its socket loop.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<EventKind, Vec<Entry>>>,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        kind: EventKind,
        cb: PayloadCallback,
    ) -> Subscription {
        self.insert(kind, Callback::Payload(cb))
    }

    pub(crate) fn subscribe_presence(self: &Arc<Self>, cb: PresenceCallback) -> Subscription {
        self.insert(EventKind::PresenceUpdate, Callback::Presence(cb))
    }

    fn insert(self: &Arc<Self>, kind: EventKind, callback: Callback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(kind)
            .or_default()
            .push(Entry { id, callback });
        Subscription {
            registry: Arc::downgrade(self),
            kind,
            id,
            active: true,
        }
    }

    fn remove(&self, kind: EventKind, id: u64) {
        if let Some(list) = self.lock().get_mut(&kind) {
            list.retain(|entry| entry.id != id);
        }
    }

    /// Number of callbacks currently registered for `kind`.
    #[cfg(test)]
    pub(crate) fn len(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every payload callback registered for `kind`, in order.
    ///
    /// The table lock is released before any callback runs, so callbacks may
    /// register or drop subscriptions themselves.
    pub(crate) fn emit(&self, kind: EventKind, payload: &Value) {
        let callbacks: Vec<PayloadCallback> = self
            .snapshot(kind)
            .into_iter()
            .filter_map(|cb| match cb {
                Callback::Payload(cb) => Some(cb),
                Callback::Presence(_) => None,
            })
            .collect();
        debug!(?kind, count = callbacks.len(), "dispatching event");
        for cb in callbacks {
            cb(payload);
        }
    }

    /// Invoke every presence callback with the roster snapshot, in order.
    pub(crate) fn emit_presence(&self, roster: &PresenceList) {
        for cb in self.snapshot(EventKind::PresenceUpdate) {
            if let Callback::Presence(cb) = cb {
                cb(roster);
            }
        }
    }

    fn snapshot(&self, kind: EventKind) -> Vec<Callback> {
        self.lock()
            .get(&kind)
            .map(|list| list.iter().map(|entry| entry.callback.clone()).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Vec<Entry>>> {
        // A panicking callback never holds this lock, so the map stays consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one registered callback.
///
/// Dropping the handle unregisters the callback. Call [`detach`](Self::detach)
/// to keep it registered for as long as the session lives.
#[must_use = "dropping a Subscription immediately unregisters its callback"]
pub struct Subscription {
    registry: Weak<CallbackRegistry>,
    kind: EventKind,
    id: u64,
    active: bool,
}

impl Subscription {
    /// The kind of event this subscription listens to.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the callback registered permanently and discard the handle.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.kind, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> PayloadCallback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for = Arc::clone(&log);
        let make = move |tag: &str| -> PayloadCallback {
            let log = Arc::clone(&log_for);
            let tag = tag.to_string();
            Arc::new(move |payload: &Value| {
                log.lock().unwrap().push(format!("{tag}:{payload}"));
            })
        };
        (log, make)
    }

    #[test]
    fn callbacks_fire_in_registration_order() {
        let registry = CallbackRegistry::new();
        let (log, make) = recorder();

        let _a = registry.subscribe(EventKind::ChatMessage, make("a"));
        let _b = registry.subscribe(EventKind::ChatMessage, make("b"));
        let _c = registry.subscribe(EventKind::ChatMessage, make("c"));

        registry.emit(EventKind::ChatMessage, &json!({"message": "hi"}));

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                r#"a:{"message":"hi"}"#,
                r#"b:{"message":"hi"}"#,
                r#"c:{"message":"hi"}"#
            ]
        );
    }

    #[test]
    fn emit_only_reaches_matching_kind() {
        let registry = CallbackRegistry::new();
        let (log, make) = recorder();

        let _draw = registry.subscribe(EventKind::DrawingMove, make("draw"));
        let _chat = registry.subscribe(EventKind::ChatMessage, make("chat"));

        registry.emit(EventKind::DrawingMove, &json!({}));
        assert_eq!(*log.lock().unwrap(), vec!["draw:{}"]);
    }

    #[test]
    fn same_callback_registered_twice_fires_twice() {
        let registry = CallbackRegistry::new();
        let (log, make) = recorder();
        let cb = make("dup");

        let _one = registry.subscribe(EventKind::GameStarted, Arc::clone(&cb));
        let _two = registry.subscribe(EventKind::GameStarted, cb);

        registry.emit(EventKind::GameStarted, &json!(null));
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn dropping_subscription_removes_only_that_callback() {
        let registry = CallbackRegistry::new();
        let (log, make) = recorder();

        let first = registry.subscribe(EventKind::RoundEnded, make("first"));
        let _second = registry.subscribe(EventKind::RoundEnded, make("second"));
        drop(first);

        assert_eq!(registry.len(EventKind::RoundEnded), 1);
        registry.emit(EventKind::RoundEnded, &json!(1));
        assert_eq!(*log.lock().unwrap(), vec!["second:1"]);
    }

    #[test]
    fn unsubscribe_and_detach() {
        let registry = CallbackRegistry::new();
        let (_log, make) = recorder();

        registry.subscribe(EventKind::TurnChanged, make("kept")).detach();
        let gone = registry.subscribe(EventKind::TurnChanged, make("gone"));
        assert_eq!(gone.kind(), EventKind::TurnChanged);
        gone.unsubscribe();

        assert_eq!(registry.len(EventKind::TurnChanged), 1);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = CallbackRegistry::new();
        let (_log, make) = recorder();
        let sub = registry.subscribe(EventKind::GameEnded, make("x"));
        drop(registry);
        drop(sub);
    }

    #[test]
    fn callback_may_subscribe_during_dispatch() {
        let registry = CallbackRegistry::new();
        let inner = Arc::clone(&registry);
        let _sub = registry.subscribe(
            EventKind::JoinSuccess,
            Arc::new(move |_: &Value| {
                inner
                    .subscribe(EventKind::JoinSuccess, Arc::new(|_: &Value| {}))
                    .detach();
            }),
        );

        registry.emit(EventKind::JoinSuccess, &json!({}));
        assert_eq!(registry.len(EventKind::JoinSuccess), 2);
    }

    #[test]
    fn presence_callbacks_receive_roster() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let _sub = registry.subscribe_presence(Arc::new(move |roster: &PresenceList| {
            seen_cb.lock().unwrap().push(roster.len());
        }));

        let mut roster = PresenceList::new();
        roster.insert("u1".into(), Default::default());
        registry.emit_presence(&roster);
        registry.emit(EventKind::PresenceUpdate, &json!({}));

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }
}
