//! Per-user subscription registry and non-blocking fan-out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use tm_core::UserId;

use crate::event::LiveEvent;

/// Per-subscription queue depth. Events carry no payload, so a full queue
/// already guarantees the subscriber will see a refresh.
const CHANNEL_CAPACITY: usize = 16;

/// Identifies one subscription, unique for the lifetime of a [`Broadcaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct Handle {
    id: SubscriberId,
    tx: mpsc::Sender<LiveEvent>,
}

#[derive(Debug, Default)]
struct Registry {
    handles: DashMap<UserId, Vec<Handle>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, user_id: UserId, id: SubscriberId) -> bool {
        let removed = match self.handles.get_mut(&user_id) {
            Some(mut handles) => {
                let before = handles.len();
                handles.retain(|handle| handle.id != id);
                handles.len() != before
            }
            None => false,
        };
        // The shard guard above must be released before remove_if locks it again.
        self.handles.remove_if(&user_id, |_, handles| handles.is_empty());
        removed
    }
}

/// Fans change signals out to every open subscription of a user.
///
/// Cloning is cheap and every clone shares the same registry. Subscriptions
/// of different users never see each other's events.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscription for `user_id`.
    ///
    /// The subscription stays registered until [`Broadcaster::unsubscribe`] is
    /// called or the [`Subscription`] is dropped.
    pub fn subscribe(&self, user_id: UserId) -> Subscription {
        let id = SubscriberId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.registry
            .handles
            .entry(user_id)
            .or_default()
            .push(Handle { id, tx });
        debug!(%user_id, subscriber = %id, "subscribed");

        Subscription {
            user_id,
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    ///
    /// The subscription's stream ends once queued events are drained.
    pub fn unsubscribe(&self, user_id: UserId, id: SubscriberId) -> bool {
        let removed = self.registry.remove(user_id, id);
        if removed {
            debug!(%user_id, subscriber = %id, "unsubscribed");
        }
        removed
    }

    /// Signals every subscription of `user_id` that its data changed.
    ///
    /// Never blocks and never fails. Returns how many subscriptions will
    /// observe the update; subscriptions whose receiver is gone are pruned.
    pub fn notify(&self, user_id: UserId) -> usize {
        // Snapshot the senders so no shard lock is held while sending.
        let senders: Vec<(SubscriberId, mpsc::Sender<LiveEvent>)> = self
            .registry
            .handles
            .get(&user_id)
            .map(|handles| {
                handles
                    .iter()
                    .map(|handle| (handle.id, handle.tx.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        let mut stale = Vec::new();
        for (id, tx) in senders {
            match tx.try_send(LiveEvent::DataUpdate) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(%user_id, subscriber = %id, "update coalesced");
                    delivered += 1;
                }
                Err(TrySendError::Closed(_)) => stale.push(id),
            }
        }

        for id in stale {
            debug!(%user_id, subscriber = %id, "pruning closed subscription");
            self.registry.remove(user_id, id);
        }

        trace!(%user_id, delivered, "notified");
        delivered
    }

    /// Number of open subscriptions for `user_id`.
    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.registry
            .handles
            .get(&user_id)
            .map_or(0, |handles| handles.len())
    }
}

/// Receiving end of one subscription.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    user_id: UserId,
    id: SubscriberId,
    rx: mpsc::Receiver<LiveEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Waits for the next event. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.rx.recv().await
    }

    /// Returns a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<LiveEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.user_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const ALICE: UserId = UserId::new(1);
    const BOB: UserId = UserId::new(2);

    #[tokio::test]
    async fn notify_reaches_every_subscription_of_the_user() {
        let live = Broadcaster::new();
        let mut first = live.subscribe(ALICE);
        let mut second = live.subscribe(ALICE);
        let mut other = live.subscribe(BOB);

        assert_eq!(live.notify(ALICE), 2);

        assert_eq!(first.recv().await, Some(LiveEvent::DataUpdate));
        assert_eq!(second.recv().await, Some(LiveEvent::DataUpdate));
        assert_eq!(other.try_recv(), None);
    }

    #[tokio::test]
    async fn notify_without_subscribers_is_a_no_op() {
        let live = Broadcaster::new();
        assert_eq!(live.notify(ALICE), 0);
        assert_eq!(live.subscriber_count(ALICE), 0);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_ends_the_stream() {
        let live = Broadcaster::new();
        let mut sub = live.subscribe(ALICE);
        let id = sub.id();

        assert!(live.unsubscribe(ALICE, id));
        assert!(!live.unsubscribe(ALICE, id));
        assert_eq!(live.notify(ALICE), 0);

        let ended = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("stream should end promptly");
        assert_eq!(ended, None);
    }

    #[tokio::test]
    async fn unsubscribe_with_wrong_user_does_nothing() {
        let live = Broadcaster::new();
        let sub = live.subscribe(ALICE);

        assert!(!live.unsubscribe(BOB, sub.id()));
        assert_eq!(live.subscriber_count(ALICE), 1);
    }

    #[tokio::test]
    async fn dropping_a_subscription_unsubscribes() {
        let live = Broadcaster::new();
        let kept = live.subscribe(ALICE);
        let dropped = live.subscribe(ALICE);
        assert_eq!(live.subscriber_count(ALICE), 2);

        drop(dropped);
        assert_eq!(live.subscriber_count(ALICE), 1);
        assert_eq!(live.notify(ALICE), 1);

        drop(kept);
        assert_eq!(live.subscriber_count(ALICE), 0);
        assert!(live.registry.handles.is_empty());
    }

    #[tokio::test]
    async fn closed_receivers_are_pruned() {
        let live = Broadcaster::new();
        let mut healthy = live.subscribe(ALICE);

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        live.registry
            .handles
            .entry(ALICE)
            .or_default()
            .push(Handle {
                id: SubscriberId(u64::MAX),
                tx,
            });
        assert_eq!(live.subscriber_count(ALICE), 2);

        assert_eq!(live.notify(ALICE), 1);
        assert_eq!(live.subscriber_count(ALICE), 1);
        assert_eq!(healthy.recv().await, Some(LiveEvent::DataUpdate));
    }

    #[tokio::test]
    async fn bursts_coalesce_instead_of_blocking() {
        let live = Broadcaster::new();
        let mut sub = live.subscribe(ALICE);

        for _ in 0..CHANNEL_CAPACITY * 3 {
            assert_eq!(live.notify(ALICE), 1);
        }

        let mut received = 0;
        while sub.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn subscription_outliving_broadcaster_ends() {
        let live = Broadcaster::new();
        let mut sub = live.subscribe(ALICE);
        drop(live);

        assert_eq!(sub.recv().await, None);
        drop(sub);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_subscribe_and_notify() {
        let live = Broadcaster::new();
        let mut subs: Vec<_> = (0..8).map(|_| live.subscribe(ALICE)).collect();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let live = live.clone();
            tasks.push(tokio::spawn(async move {
                let extra = live.subscribe(ALICE);
                let delivered = live.notify(ALICE);
                drop(extra);
                delivered
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap() >= 8);
        }

        for sub in &mut subs {
            assert_eq!(sub.try_recv(), Some(LiveEvent::DataUpdate));
        }
        assert_eq!(live.subscriber_count(ALICE), 8);
    }

    #[test]
    fn subscriber_ids_are_unique() {
        let live = Broadcaster::new();
        let a = live.subscribe(ALICE);
        let b = live.subscribe(ALICE);
        let c = live.subscribe(BOB);
        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_eq!(c.user_id(), BOB);
    }
}
