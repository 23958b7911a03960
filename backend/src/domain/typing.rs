//! Typing indicators with automatic expiry.
//!
//! Indicators are never persisted. Each start bumps a generation number and
//! schedules an expiry task; an expiry only fires if no later start or stop
//! replaced the generation it was scheduled for.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::{ConnectionRegistry, GatewayEvent, UserId};

/// Receiver to (typist to generation) sets.
pub struct TypingTracker {
    typing: DashMap<UserId, HashMap<UserId, u64>>,
    generations: AtomicU64,
    registry: Arc<ConnectionRegistry>,
    expiry: Duration,
}

impl TypingTracker {
    /// Create a tracker that expires indicators after `expiry`.
    pub fn new(registry: Arc<ConnectionRegistry>, expiry: Duration) -> Self {
        Self {
            typing: DashMap::new(),
            generations: AtomicU64::new(0),
            registry,
            expiry,
        }
    }

    /// Mark `typist` as typing to `receiver` and notify the receiver.
    ///
    /// Must be called from within a Tokio runtime; the expiry runs as a
    /// spawned task.
    pub fn start(self: &Arc<Self>, typist: UserId, receiver: UserId) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        self.typing
            .entry(receiver)
            .or_default()
            .insert(typist, generation);
        self.notify(typist, receiver, true);

        let tracker = Arc::clone(self);
        let expiry = self.expiry;
        tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            if tracker.remove(typist, receiver, Some(generation)) {
                debug!(typist = %typist, receiver = %receiver, "typing indicator expired");
                tracker.notify(typist, receiver, false);
            }
        });
    }

    /// Stop the indicator. Returns `false` when `typist` was not typing.
    pub fn stop(&self, typist: UserId, receiver: UserId) -> bool {
        let removed = self.remove(typist, receiver, None);
        if removed {
            self.notify(typist, receiver, false);
        }
        removed
    }

    /// Stop every indicator `typist` holds, e.g. when they disconnect.
    pub fn stop_all(&self, typist: UserId) -> usize {
        let receivers: Vec<UserId> = self
            .typing
            .iter()
            .filter(|entry| entry.value().contains_key(&typist))
            .map(|entry| *entry.key())
            .collect();
        receivers
            .into_iter()
            .filter(|receiver| self.stop(typist, *receiver))
            .count()
    }

    /// Whether `typist` is currently typing to `receiver`.
    pub fn is_typing(&self, typist: &UserId, receiver: &UserId) -> bool {
        self.typing
            .get(receiver)
            .is_some_and(|set| set.contains_key(typist))
    }

    fn remove(&self, typist: UserId, receiver: UserId, generation: Option<u64>) -> bool {
        let removed = match self.typing.get_mut(&receiver) {
            Some(mut set) => match (set.get(&typist), generation) {
                (Some(current), Some(expected)) if *current != expected => false,
                (Some(_), _) => set.remove(&typist).is_some(),
                (None, _) => false,
            },
            None => false,
        };
        self.typing.remove_if(&receiver, |_, set| set.is_empty());
        removed
    }

    fn notify(&self, typist: UserId, receiver: UserId, is_typing: bool) {
        self.registry.deliver(
            &receiver,
            GatewayEvent::UserTyping {
                user_id: typist,
                is_typing,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionCommand, ConnectionHandle, ConnectionReceiver};
    use crate::test_support::MutableClock;

    struct Harness {
        tracker: Arc<TypingTracker>,
        typist: UserId,
        receiver: UserId,
        receiver_rx: ConnectionReceiver,
    }

    fn harness(expiry: Duration) -> Harness {
        let registry = Arc::new(ConnectionRegistry::new(MutableClock::fixed()));
        let receiver = UserId::random();
        let (handle, receiver_rx) = ConnectionHandle::channel();
        registry.register(receiver, handle);
        Harness {
            tracker: Arc::new(TypingTracker::new(registry, expiry)),
            typist: UserId::random(),
            receiver,
            receiver_rx,
        }
    }

    fn typing_flag(command: ConnectionCommand) -> bool {
        match command {
            ConnectionCommand::Deliver(GatewayEvent::UserTyping { is_typing, .. }) => is_typing,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_expires_after_delay() {
        let mut h = harness(Duration::from_secs(5));
        h.tracker.start(h.typist, h.receiver);
        assert!(typing_flag(h.receiver_rx.try_recv().expect("start event")));

        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(!h.tracker.is_typing(&h.typist, &h.receiver));
        assert!(!typing_flag(h.receiver_rx.try_recv().expect("expiry event")));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_postpones_expiry() {
        let mut h = harness(Duration::from_secs(5));
        h.tracker.start(h.typist, h.receiver);
        tokio::time::sleep(Duration::from_secs(3)).await;
        h.tracker.start(h.typist, h.receiver);
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(h.tracker.is_typing(&h.typist, &h.receiver));
        assert!(typing_flag(h.receiver_rx.try_recv().expect("first start")));
        assert!(typing_flag(h.receiver_rx.try_recv().expect("second start")));
        assert!(h.receiver_rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!h.tracker.is_typing(&h.typist, &h.receiver));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_start_is_a_no_op() {
        let mut h = harness(Duration::from_secs(5));
        assert!(!h.tracker.stop(h.typist, h.receiver));
        assert!(h.receiver_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_cancels_pending_expiry() {
        let mut h = harness(Duration::from_secs(5));
        h.tracker.start(h.typist, h.receiver);
        assert!(h.tracker.stop(h.typist, h.receiver));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(typing_flag(h.receiver_rx.try_recv().expect("start")));
        assert!(!typing_flag(h.receiver_rx.try_recv().expect("stop")));
        assert!(h.receiver_rx.try_recv().is_err(), "expiry must not repeat the stop");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_clears_every_receiver() {
        let h = harness(Duration::from_secs(5));
        let other = UserId::random();
        h.tracker.start(h.typist, h.receiver);
        h.tracker.start(h.typist, other);

        assert_eq!(h.tracker.stop_all(h.typist), 2);
        assert!(!h.tracker.is_typing(&h.typist, &other));
    }
}
