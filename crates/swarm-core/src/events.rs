//! A named, synchronous publish/subscribe registry used to decouple runner
//! lifecycle signals (spawn complete, quitting, report tick) from whatever
//! consumes them.
//!
//! Handlers run on the publisher's own call stack, in registration order —
//! there is no hop onto a background task. Callers that need to do real work
//! in response to an event must dispatch onto their own scheduling context
//! (e.g. `tokio::spawn`) rather than block the publisher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::stats::Report;

pub const TOPIC_SPAWN: &str = "boomer:spawn";
/// Legacy alias for [`TOPIC_SPAWN`]. Existing subscriber code may still
/// register against this name, so it must keep delivering spawn events.
pub const TOPIC_HATCH: &str = "boomer:hatch";
pub const TOPIC_SPAWN_COMPLETE: &str = "boomer:spawn-complete";
pub const TOPIC_STOP: &str = "boomer:stop";
pub const TOPIC_QUIT: &str = "boomer:quit";
pub const TOPIC_REPORT_TO_MASTER: &str = "boomer:report-to-master";

/// Payload carried by a published event. Most topics fire with [`Payload::None`];
/// a few carry data consumers care about.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    UserCount(u32),
    Report(Arc<Report>),
}

pub type Handler = Arc<dyn Fn(&Payload) + Send + Sync>;

/// `boomer:spawn` and `boomer:hatch` are the same topic under two names.
fn canonical_topic(topic: &str) -> String {
    if topic == TOPIC_HATCH {
        TOPIC_SPAWN.to_string()
    } else {
        topic.to_string()
    }
}

#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. Handlers registered under
    /// [`TOPIC_SPAWN`] and [`TOPIC_HATCH`] share a single delivery list.
    pub fn subscribe(&self, topic: &str, handler: Handler) {
        let key = canonical_topic(topic);
        let mut handlers = self.handlers.lock().expect("event bus mutex poisoned");
        handlers.entry(key).or_default().push(handler);
    }

    /// Invoke every handler registered for `topic`, in registration order, on
    /// the calling context.
    pub fn publish(&self, topic: &str, payload: Payload) {
        let key = canonical_topic(topic);
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().expect("event bus mutex poisoned");
            handlers.get(&key).cloned().unwrap_or_default()
        };
        for handler in snapshot {
            handler(&payload);
        }
    }

    /// Number of handlers currently registered for `topic` (alias-aware).
    /// Mainly useful for tests.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let key = canonical_topic(topic);
        self.handlers
            .lock()
            .expect("event bus mutex poisoned")
            .get(&key)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_with_no_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish(TOPIC_QUIT, Payload::None);
    }

    #[test]
    fn subscriber_is_invoked_on_publish() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        bus.subscribe(
            TOPIC_SPAWN_COMPLETE,
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.publish(TOPIC_SPAWN_COMPLETE, Payload::UserCount(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spawn_and_hatch_are_the_same_topic() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        // Subscribe under the legacy alias...
        bus.subscribe(
            TOPIC_HATCH,
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        // ...and publish under the canonical name.
        bus.publish(TOPIC_SPAWN, Payload::None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hatch_publish_reaches_spawn_subscriber() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        bus.subscribe(
            TOPIC_SPAWN,
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.publish(TOPIC_HATCH, Payload::None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            bus.subscribe(
                TOPIC_STOP,
                Arc::new(move |_| {
                    order.lock().unwrap().push(i);
                }),
            );
        }
        bus.publish(TOPIC_STOP, Payload::None);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn unrelated_topics_do_not_cross_fire() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        bus.subscribe(
            TOPIC_QUIT,
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.publish(TOPIC_STOP, Payload::None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscriber_count_counts_alias() {
        let bus = EventBus::new();
        bus.subscribe(TOPIC_SPAWN, Arc::new(|_| {}));
        bus.subscribe(TOPIC_HATCH, Arc::new(|_| {}));
        assert_eq!(bus.subscriber_count(TOPIC_SPAWN), 2);
        assert_eq!(bus.subscriber_count(TOPIC_HATCH), 2);
    }
}
