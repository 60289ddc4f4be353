//! Synchronous publish/subscribe messaging.
//!
//! The [`EventBus`] delivers [`GameEvent`]s to handlers subscribed to an exact
//! event type. Dispatch is synchronous and single-threaded:
//!
//! - Subscribers run in descending priority; equal priorities keep
//!   registration order.
//! - Each `emit` iterates a snapshot of the subscriber list taken when the
//!   emit starts. Handlers may subscribe, unsubscribe, or emit through the
//!   `&EventBus` they receive; changes apply to later emits only. A nested
//!   emit runs to completion before the outer handler continues.
//! - A handler returning `Err` is logged; the remaining subscribers still run.
//! - `once` subscribers fire exactly one time, even when a nested emit of the
//!   same type happens while the outer dispatch is still in progress.
//!
//! Every emitted event is appended to a bounded history ring (1000 events by
//! default); the oldest event is evicted first.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use realm_ecs::event::EventBus;
//!
//! let bus = EventBus::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let log = Rc::clone(&seen);
//! bus.subscribe("hit", 0, move |_, _| {
//!     log.borrow_mut().push("low");
//!     Ok(())
//! });
//! let log = Rc::clone(&seen);
//! bus.subscribe("hit", 10, move |_, _| {
//!     log.borrow_mut().push("high");
//!     Ok(())
//! });
//!
//! bus.emit("hit", serde_json::json!({"damage": 3}), None);
//! assert_eq!(*seen.borrow(), vec!["high", "low"]);
//! assert_eq!(bus.history(Some("hit"), Some(1)).len(), 1);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::entity::unix_millis;

/// Default capacity of the history ring buffer.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

// ---------------------------------------------------------------------------
// GameEvent
// ---------------------------------------------------------------------------

/// An immutable message emitted on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Event type, matched exactly against subscriptions (e.g. `"entity:moved"`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload.
    pub data: serde_json::Value,
    /// Emission time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Optional emitter tag (system name, `"world"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Handler signature. The bus reference allows re-entrant emit/subscribe.
pub type EventHandler = dyn Fn(&EventBus, &GameEvent) -> anyhow::Result<()>;

/// Handle returned by the subscribe methods; pass it to
/// [`EventBus::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    target: Target,
    id: u64,
}

impl Subscription {
    /// The event type this subscription listens to, or `None` for a
    /// [`EventBus::subscribe_all`] tap.
    pub fn event_type(&self) -> Option<&str> {
        match &self.target {
            Target::Type(t) => Some(t),
            Target::All => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Target {
    Type(String),
    All,
}

struct Subscriber {
    id: u64,
    priority: i32,
    once: bool,
    /// Set when a `once` subscriber has fired.
    spent: Cell<bool>,
    handler: Box<EventHandler>,
}

/// Outcome of one [`EventBus::emit`] call (nested emits not included).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Handlers that were invoked.
    pub delivered: usize,
    /// Handlers that returned an error.
    pub failed: usize,
}

impl EmitReport {
    /// Whether every invoked handler succeeded.
    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Single-threaded pub/sub bus with a bounded history.
///
/// All methods take `&self`; state lives behind `RefCell`s that are never
/// borrowed across a handler call.
pub struct EventBus {
    subscribers: RefCell<HashMap<String, Vec<Rc<Subscriber>>>>,
    taps: RefCell<Vec<Rc<Subscriber>>>,
    history: RefCell<VecDeque<GameEvent>>,
    history_capacity: usize,
    next_id: Cell<u64>,
}

impl EventBus {
    /// A bus with the default history capacity (1000).
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// A bus keeping at most `capacity` events of history.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RefCell::new(HashMap::new()),
            taps: RefCell::new(Vec::new()),
            history: RefCell::new(VecDeque::with_capacity(capacity.min(4096))),
            history_capacity: capacity,
            next_id: Cell::new(0),
        }
    }

    /// Subscribe to one event type.
    pub fn subscribe<F>(&self, event_type: &str, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&EventBus, &GameEvent) -> anyhow::Result<()> + 'static,
    {
        self.add(Target::Type(event_type.to_owned()), priority, false, Box::new(handler))
    }

    /// Subscribe for a single delivery; the subscription removes itself
    /// before the handler runs.
    pub fn once<F>(&self, event_type: &str, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&EventBus, &GameEvent) -> anyhow::Result<()> + 'static,
    {
        self.add(Target::Type(event_type.to_owned()), priority, true, Box::new(handler))
    }

    /// Observe every event type. Taps run after the type's own subscribers,
    /// ordered among themselves by priority.
    pub fn subscribe_all<F>(&self, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&EventBus, &GameEvent) -> anyhow::Result<()> + 'static,
    {
        self.add(Target::All, priority, false, Box::new(handler))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    ///
    /// An emit already in progress still delivers to the removed handler.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let removed = match &subscription.target {
            Target::Type(event_type) => {
                let mut subs = self.subscribers.borrow_mut();
                let removed = subs
                    .get_mut(event_type)
                    .and_then(|list| take_by_id(list, subscription.id));
                if subs.get(event_type).is_some_and(Vec::is_empty) {
                    subs.remove(event_type);
                }
                removed
            }
            Target::All => take_by_id(&mut self.taps.borrow_mut(), subscription.id),
        };
        removed.is_some()
    }

    /// Remove every subscriber of one event type.
    pub fn unsubscribe_all(&self, event_type: &str) {
        self.subscribers.borrow_mut().remove(event_type);
    }

    /// Emit an event and deliver it synchronously.
    pub fn emit(
        &self,
        event_type: &str,
        data: serde_json::Value,
        source: Option<&str>,
    ) -> EmitReport {
        let event = GameEvent {
            event_type: event_type.to_owned(),
            data,
            timestamp: unix_millis(),
            source: source.map(str::to_owned),
        };
        self.record(&event);

        // Snapshot, then release every borrow before calling out.
        let mut snapshot: Vec<Rc<Subscriber>> = self
            .subscribers
            .borrow()
            .get(event_type)
            .cloned()
            .unwrap_or_default();
        snapshot.extend(self.taps.borrow().iter().cloned());

        trace!(event_type, subscribers = snapshot.len(), "emit");

        let mut report = EmitReport::default();
        for sub in snapshot {
            if sub.spent.get() {
                continue;
            }
            if sub.once {
                sub.spent.set(true);
                self.drop_once(event_type, sub.id);
            }
            report.delivered += 1;
            if let Err(err) = (sub.handler)(self, &event) {
                report.failed += 1;
                error!(event_type, error = %err, "event handler failed");
            }
        }
        report
    }

    /// Past events, oldest first. `event_type` filters by exact type;
    /// `limit` keeps only the most recent N of the filtered set.
    pub fn history(&self, event_type: Option<&str>, limit: Option<usize>) -> Vec<GameEvent> {
        let history = self.history.borrow();
        let mut matched: Vec<GameEvent> = history
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    /// Number of events currently retained.
    pub fn history_len(&self) -> usize {
        self.history.borrow().len()
    }

    /// Capacity of the history ring.
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Number of live subscribers for one event type (taps excluded).
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers
            .borrow()
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Number of live `subscribe_all` taps.
    pub fn tap_count(&self) -> usize {
        self.taps.borrow().len()
    }

    /// Drop every subscriber, tap, and history entry.
    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
        self.taps.borrow_mut().clear();
        self.history.borrow_mut().clear();
    }

    // -- internal helpers ---------------------------------------------------

    fn add(
        &self,
        target: Target,
        priority: i32,
        once: bool,
        handler: Box<EventHandler>,
    ) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let sub = Rc::new(Subscriber {
            id,
            priority,
            once,
            spent: Cell::new(false),
            handler,
        });

        match &target {
            Target::Type(event_type) => {
                let mut subs = self.subscribers.borrow_mut();
                insert_by_priority(subs.entry(event_type.clone()).or_default(), sub);
            }
            Target::All => insert_by_priority(&mut self.taps.borrow_mut(), sub),
        }

        Subscription { target, id }
    }

    fn drop_once(&self, event_type: &str, id: u64) {
        let mut subs = self.subscribers.borrow_mut();
        if let Some(list) = subs.get_mut(event_type) {
            take_by_id(list, id);
            if list.is_empty() {
                subs.remove(event_type);
            }
        }
    }

    fn record(&self, event: &GameEvent) {
        if self.history_capacity == 0 {
            return;
        }
        let mut history = self.history.borrow_mut();
        while history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(event.clone());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subs = self.subscribers.borrow();
        f.debug_struct("EventBus")
            .field("event_types", &subs.len())
            .field("subscribers", &subs.values().map(Vec::len).sum::<usize>())
            .field("taps", &self.taps.borrow().len())
            .field("history_len", &self.history.borrow().len())
            .field("history_capacity", &self.history_capacity)
            .finish()
    }
}

/// Insert after every subscriber with priority >= `sub.priority`, which keeps
/// the list sorted descending and stable for ties.
fn insert_by_priority(list: &mut Vec<Rc<Subscriber>>, sub: Rc<Subscriber>) {
    let at = list.partition_point(|s| s.priority >= sub.priority);
    list.insert(at, sub);
}

fn take_by_id(list: &mut Vec<Rc<Subscriber>>, id: u64) -> Option<Rc<Subscriber>> {
    let pos = list.iter().position(|s| s.id == id)?;
    Some(list.remove(pos))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Log = Rc<RefCell<Vec<String>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn recorder(
        log: &Log,
        tag: &str,
    ) -> impl Fn(&EventBus, &GameEvent) -> anyhow::Result<()> + 'static {
        let log = Rc::clone(log);
        let tag = tag.to_owned();
        move |_, _| {
            log.borrow_mut().push(tag.clone());
            Ok(())
        }
    }

    // -- 1. ordering --------------------------------------------------------

    #[test]
    fn priority_descending_then_registration_order() {
        let bus = EventBus::new();
        let seen = log();
        bus.subscribe("hit", 0, recorder(&seen, "a0"));
        bus.subscribe("hit", 10, recorder(&seen, "b10"));
        bus.subscribe("hit", 0, recorder(&seen, "c0"));
        bus.subscribe("hit", 10, recorder(&seen, "d10"));
        bus.subscribe("hit", -5, recorder(&seen, "e-5"));

        bus.emit("hit", json!(null), None);
        assert_eq!(*seen.borrow(), vec!["b10", "d10", "a0", "c0", "e-5"]);
    }

    #[test]
    fn only_exact_type_receives() {
        let bus = EventBus::new();
        let seen = log();
        bus.subscribe("entity:moved", 0, recorder(&seen, "moved"));
        bus.emit("entity:created", json!({}), None);
        bus.emit("entity:*", json!({}), None);
        assert!(seen.borrow().is_empty());
    }

    // -- 2. once ------------------------------------------------------------

    #[test]
    fn once_fires_exactly_once() {
        let bus = EventBus::new();
        let seen = log();
        bus.once("tick", 0, recorder(&seen, "once"));
        for _ in 0..5 {
            bus.emit("tick", json!(null), None);
        }
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(bus.subscriber_count("tick"), 0);
    }

    #[test]
    fn once_survives_reentrant_emit_of_same_type() {
        let bus = EventBus::new();
        let seen = log();
        // Higher priority handler re-emits "ping" once.
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        bus.subscribe("ping", 10, move |bus, _| {
            if !f.replace(true) {
                bus.emit("ping", json!(null), None);
            }
            Ok(())
        });
        bus.once("ping", 0, recorder(&seen, "once"));

        bus.emit("ping", json!(null), None);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn unsubscribe_once_before_emit() {
        let bus = EventBus::new();
        let seen = log();
        let sub = bus.once("x", 0, recorder(&seen, "x"));
        assert!(bus.unsubscribe(&sub));
        assert!(!bus.unsubscribe(&sub));
        bus.emit("x", json!(null), None);
        assert!(seen.borrow().is_empty());
    }

    // -- 3. snapshot semantics ---------------------------------------------

    #[test]
    fn subscribe_during_dispatch_affects_next_emit_only() {
        let bus = EventBus::new();
        let seen = log();
        let inner = Rc::clone(&seen);
        bus.subscribe("evt", 0, move |bus, _| {
            inner.borrow_mut().push("outer".into());
            bus.subscribe("evt", 100, recorder(&inner, "late"));
            Ok(())
        });

        bus.emit("evt", json!(null), None);
        assert_eq!(*seen.borrow(), vec!["outer"]);

        seen.borrow_mut().clear();
        bus.emit("evt", json!(null), None);
        assert_eq!(seen.borrow()[0], "late");
    }

    #[test]
    fn unsubscribe_during_dispatch_does_not_shrink_current_fanout() {
        let bus = EventBus::new();
        let seen = log();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let v = Rc::clone(&victim);
        bus.subscribe("evt", 10, move |bus, _| {
            if let Some(sub) = v.borrow_mut().take() {
                bus.unsubscribe(&sub);
            }
            Ok(())
        });
        *victim.borrow_mut() = Some(bus.subscribe("evt", 0, recorder(&seen, "victim")));

        // Still delivered on the emit that removed it, gone afterwards.
        bus.emit("evt", json!(null), None);
        bus.emit("evt", json!(null), None);
        assert_eq!(*seen.borrow(), vec!["victim"]);
        assert_eq!(bus.subscriber_count("evt"), 1);
    }

    #[test]
    fn nested_emit_completes_before_outer_continues() {
        let bus = EventBus::new();
        let seen = log();
        let l = Rc::clone(&seen);
        bus.subscribe("outer", 10, move |bus, _| {
            l.borrow_mut().push("outer-start".into());
            bus.emit("inner", json!(null), None);
            l.borrow_mut().push("outer-end".into());
            Ok(())
        });
        bus.subscribe("inner", 0, recorder(&seen, "inner"));
        bus.subscribe("outer", 0, recorder(&seen, "outer-low"));

        bus.emit("outer", json!(null), None);
        assert_eq!(
            *seen.borrow(),
            vec!["outer-start", "inner", "outer-end", "outer-low"]
        );
    }

    // -- 4. fault isolation -------------------------------------------------

    #[test]
    fn failing_handler_does_not_stop_others() {
        let bus = EventBus::new();
        let seen = log();
        bus.subscribe("boom", 10, |_, _| anyhow::bail!("handler exploded"));
        bus.subscribe("boom", 0, recorder(&seen, "survivor"));

        let report = bus.emit("boom", json!(null), None);
        assert_eq!(*seen.borrow(), vec!["survivor"]);
        assert_eq!(report, EmitReport { delivered: 2, failed: 1 });
        assert!(!report.all_ok());
    }

    // -- 5. taps ------------------------------------------------------------

    #[test]
    fn taps_see_every_type_after_typed_subscribers() {
        let bus = EventBus::new();
        let seen = log();
        bus.subscribe("a", -100, recorder(&seen, "typed"));
        let tap_log = Rc::clone(&seen);
        let tap = bus.subscribe_all(100, move |_, e| {
            tap_log.borrow_mut().push(format!("tap:{}", e.event_type));
            Ok(())
        });

        bus.emit("a", json!(null), None);
        bus.emit("b", json!(null), None);
        assert_eq!(*seen.borrow(), vec!["typed", "tap:a", "tap:b"]);

        assert!(bus.unsubscribe(&tap));
        assert_eq!(bus.tap_count(), 0);
        assert!(tap.event_type().is_none());
    }

    // -- 6. history ---------------------------------------------------------

    #[test]
    fn history_filters_and_limits() {
        let bus = EventBus::new();
        bus.emit("hit", json!(1), Some("combat"));
        bus.emit("miss", json!(2), None);
        bus.emit("hit", json!(3), None);

        let hits = bus.history(Some("hit"), None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source.as_deref(), Some("combat"));

        let last = bus.history(Some("hit"), Some(1));
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].data, json!(3));

        assert_eq!(bus.history(None, None).len(), 3);
        assert_eq!(bus.history(None, Some(10)).len(), 3);
    }

    #[test]
    fn history_ring_evicts_oldest_first() {
        let bus = EventBus::new();
        for i in 0..1_050 {
            bus.emit("n", json!(i), None);
        }
        assert_eq!(bus.history_len(), DEFAULT_HISTORY_CAPACITY);
        let all = bus.history(None, None);
        assert_eq!(all[0].data, json!(50));
        assert_eq!(all[all.len() - 1].data, json!(1_049));
    }

    #[test]
    fn zero_capacity_keeps_no_history() {
        let bus = EventBus::with_history_capacity(0);
        bus.emit("n", json!(1), None);
        assert_eq!(bus.history_len(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let bus = EventBus::new();
        let seen = log();
        bus.subscribe("a", 0, recorder(&seen, "a"));
        bus.subscribe_all(0, recorder(&seen, "tap"));
        bus.emit("a", json!(null), None);
        bus.clear();
        bus.emit("a", json!(null), None);
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(bus.history_len(), 1);
    }
}
