//! Subscriber Fan-out
//!
//! Delivers published [`FeedState`]s to registered callbacks.
//!
//! # Delivery Model
//!
//! State transitions push a versioned state into an outbox while the
//! client's state lock is held. After that lock is released, the publishing
//! thread drains the outbox and runs callbacks with no lock held. Only one
//! thread drains at a time; a publish that happens during a drain (from
//! another thread, or re-entrantly from a callback) is picked up by the
//! drain already running. This gives:
//!
//! - every state reaches every live subscriber in registration order,
//! - states are delivered in the order they were published,
//! - callbacks may subscribe, unsubscribe, connect or disconnect freely.
//!
//! Each subscriber remembers the version it was registered at and never
//! receives an older state. Its first state travels through the same outbox
//! as a delivery addressed to it alone, so it cannot overtake or trail the
//! states published around it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::domain::connection::FeedState;

/// Callback invoked with every published state.
pub type Callback = Arc<dyn Fn(&FeedState) + Send + Sync>;

/// Identifier assigned to each subscriber.
pub type SubscriberId = u64;

#[derive(Clone)]
struct Subscriber {
    id: SubscriberId,
    since_version: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    subscribers: Vec<Subscriber>,
}

struct Delivery {
    version: u64,
    state: FeedState,
    target: Option<SubscriberId>,
}

impl Delivery {
    fn reaches(&self, subscriber: &Subscriber) -> bool {
        match self.target {
            Some(id) => id == subscriber.id,
            None => self.version > subscriber.since_version,
        }
    }
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<Delivery>,
    draining: bool,
}

/// Registry of subscribers plus the ordered delivery outbox.
#[derive(Default)]
pub struct Notifier {
    registry: Mutex<Registry>,
    outbox: Mutex<Outbox>,
}

impl Notifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback that will see states newer than `since_version`.
    ///
    /// Returns the subscriber id and its liveness flag.
    pub fn register(&self, since_version: u64, callback: Callback) -> (SubscriberId, Arc<AtomicBool>) {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        let active = Arc::new(AtomicBool::new(true));

        registry.subscribers.push(Subscriber {
            id,
            since_version,
            active: Arc::clone(&active),
            callback,
        });

        (id, active)
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|s| {
            if s.id == id {
                s.active.store(false, Ordering::Release);
                false
            } else {
                true
            }
        });
        registry.subscribers.len() != before
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Queue a state for delivery. Call [`Notifier::drain`] once no lock is held.
    pub fn enqueue(&self, version: u64, state: FeedState) {
        self.push(Delivery {
            version,
            state,
            target: None,
        });
    }

    /// Queue a state for one subscriber only, ahead of anything enqueued later.
    pub fn enqueue_for(&self, id: SubscriberId, version: u64, state: FeedState) {
        self.push(Delivery {
            version,
            state,
            target: Some(id),
        });
    }

    fn push(&self, delivery: Delivery) {
        self.outbox.lock().queue.push_back(delivery);
    }

    /// Deliver queued states unless another drain is already running.
    pub fn drain(&self) {
        {
            let mut outbox = self.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        let _guard = DrainGuard { notifier: self };

        loop {
            let next = self.outbox.lock().queue.pop_front();
            let Some(delivery) = next else {
                break;
            };

            let subscribers: Vec<Subscriber> = self
                .registry
                .lock()
                .subscribers
                .iter()
                .filter(|s| delivery.reaches(s))
                .cloned()
                .collect();

            for subscriber in subscribers {
                if !subscriber.active.load(Ordering::Acquire) {
                    continue;
                }
                (subscriber.callback)(&delivery.state);
            }
        }
    }
}

/// Clears the draining flag on exit, including when a callback panics.
struct DrainGuard<'a> {
    notifier: &'a Notifier,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut outbox = self.notifier.outbox.lock();
        outbox.draining = false;

        // A state queued after the last pop would otherwise be stranded.
        if !outbox.queue.is_empty() && !std::thread::panicking() {
            drop(outbox);
            self.notifier.drain();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::domain::connection::ConnectionStatus;

    fn state(status: ConnectionStatus) -> FeedState {
        FeedState {
            status,
            ..FeedState::default()
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<ConnectionStatus>>>, Callback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: Callback = Arc::new(move |s: &FeedState| sink.lock().push(s.status));
        (seen, callback)
    }

    #[test]
    fn delivers_in_publish_order() {
        let notifier = Notifier::new();
        let (seen, callback) = recorder();
        notifier.register(0, callback);

        notifier.enqueue(1, state(ConnectionStatus::Connecting));
        notifier.enqueue(2, state(ConnectionStatus::Connected));
        notifier.drain();

        assert_eq!(
            *seen.lock(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn delivers_in_registration_order() {
        let notifier = Notifier::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            notifier.register(0, Arc::new(move |_: &FeedState| order.lock().push(tag)));
        }

        notifier.enqueue(1, FeedState::default());
        notifier.drain();

        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn skips_states_older_than_registration() {
        let notifier = Notifier::new();
        let (seen, callback) = recorder();
        notifier.register(5, callback);

        notifier.enqueue(5, state(ConnectionStatus::Connecting));
        notifier.enqueue(6, state(ConnectionStatus::Connected));
        notifier.drain();

        assert_eq!(*seen.lock(), vec![ConnectionStatus::Connected]);
    }

    #[test]
    fn targeted_delivery_reaches_only_its_subscriber() {
        let notifier = Notifier::new();
        let (early, early_cb) = recorder();
        let (late, late_cb) = recorder();
        notifier.register(0, early_cb);
        let (late_id, _) = notifier.register(3, late_cb);

        notifier.enqueue_for(late_id, 3, state(ConnectionStatus::Connecting));
        notifier.enqueue(4, state(ConnectionStatus::Connected));
        notifier.drain();

        assert_eq!(*early.lock(), vec![ConnectionStatus::Connected]);
        assert_eq!(
            *late.lock(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn targeted_delivery_waits_behind_queued_states() {
        let notifier = Notifier::new();
        let (seen, callback) = recorder();

        // Version 1 was queued before the subscriber registered.
        notifier.enqueue(1, state(ConnectionStatus::Connecting));
        let (id, _) = notifier.register(1, callback);
        notifier.enqueue_for(id, 1, state(ConnectionStatus::Connecting));
        notifier.enqueue(2, state(ConnectionStatus::Connected));
        notifier.drain();

        assert_eq!(
            *seen.lock(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn targeted_delivery_skips_unregistered_subscriber() {
        let notifier = Notifier::new();
        let (seen, callback) = recorder();
        let (id, _) = notifier.register(0, callback);

        notifier.enqueue_for(id, 0, FeedState::default());
        notifier.unregister(id);
        notifier.drain();

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn unregister_is_idempotent() {
        let notifier = Notifier::new();
        let (id, active) = notifier.register(0, Arc::new(|_: &FeedState| {}));

        assert_eq!(notifier.subscriber_count(), 1);
        assert!(notifier.unregister(id));
        assert!(!notifier.unregister(id));
        assert!(!active.load(Ordering::Acquire));
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn reentrant_enqueue_is_delivered_after_current_state() {
        let notifier = Arc::new(Notifier::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (seen, recorder_cb) = recorder();

        let inner = Arc::clone(&notifier);
        let counter = Arc::clone(&calls);
        notifier.register(
            0,
            Arc::new(move |s: &FeedState| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    assert_eq!(s.status, ConnectionStatus::Connecting);
                    inner.enqueue(2, state(ConnectionStatus::Connected));
                    inner.drain();
                }
            }),
        );
        notifier.register(0, recorder_cb);

        notifier.enqueue(1, state(ConnectionStatus::Connecting));
        notifier.drain();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *seen.lock(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn unsubscribe_during_delivery_stops_later_subscriber() {
        let notifier = Arc::new(Notifier::new());
        let (seen, recorder_cb) = recorder();

        // The recorder registers second; the first subscriber removes it mid-delivery.
        let inner = Arc::clone(&notifier);
        notifier.register(
            0,
            Arc::new(move |_: &FeedState| {
                inner.unregister(2);
            }),
        );
        let (id, _) = notifier.register(0, recorder_cb);
        assert_eq!(id, 2);

        notifier.enqueue(1, FeedState::default());
        notifier.drain();

        assert!(seen.lock().is_empty());
    }
}
