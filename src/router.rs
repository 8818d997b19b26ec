//! Topic registry: routes published messages into subscription queues.

use crate::error::Result;
use crate::subscription::Subscribable;
use crate::types::{Message, Sequence, SubscriptionId};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// A registered executor's wake-up channel.
///
/// Each channel holds at most one pending token, so a burst of publishes
/// collapses into a single wake-up per executor.
pub(crate) struct Waker {
    pub(crate) id: u64,
    pub(crate) sender: Sender<()>,
    pub(crate) receiver: Receiver<()>,
}

/// Wake-up channels of every executor attached to a router.
struct WakerSet {
    next_id: AtomicU64,
    senders: RwLock<Vec<(u64, Sender<()>)>>,
}

impl WakerSet {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            senders: RwLock::new(Vec::new()),
        }
    }

    fn register(&self) -> Waker {
        let (sender, receiver) = bounded(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.senders.write().push((id, sender.clone()));
        Waker {
            id,
            sender,
            receiver,
        }
    }

    fn unregister(&self, id: u64) {
        self.senders.write().retain(|(waker, _)| *waker != id);
    }

    fn notify_all(&self) {
        for (_, sender) in self.senders.read().iter() {
            // Full means a wake-up is already pending.
            let _ = sender.try_send(());
        }
    }
}

/// Routing counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Total `publish` calls.
    pub published: u64,
    /// Publishes that found no subscriber.
    pub unrouted: u64,
    pub topics: usize,
    pub subscriptions: usize,
}

/// Maps topic names to the subscriptions interested in them.
///
/// Registration is rare compared to publishing, so the map sits behind a
/// read-write lock and `publish` only ever takes the read side.
pub struct TopicRouter {
    topics: RwLock<HashMap<Arc<str>, Vec<Arc<dyn Subscribable>>>>,
    next_sequence: AtomicU64,
    published: AtomicU64,
    unrouted: AtomicU64,
    wakers: WakerSet,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
            published: AtomicU64::new(0),
            unrouted: AtomicU64::new(0),
            wakers: WakerSet::new(),
        }
    }

    /// Add a subscription under its topic, creating the topic entry if needed.
    pub fn register(&self, subscription: Arc<dyn Subscribable>) {
        let key: Arc<str> = Arc::from(subscription.topic());
        self.topics
            .write()
            .entry(key)
            .or_insert_with_key(|topic| {
                debug!(topic = %topic, "Topic created");
                Vec::new()
            })
            .push(subscription);
    }

    /// Remove a subscription. The topic entry goes away with its last
    /// subscription. Returns false if it was not registered.
    pub fn unregister(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut topics = self.topics.write();
        let Some(subs) = topics.get_mut(topic) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id() != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            topics.remove(topic);
            debug!(topic, "Topic removed");
        }
        removed
    }

    /// Fan a payload out to every subscription on `topic`.
    ///
    /// Returns the number of queues the message reached. Publishing to a topic
    /// nobody subscribes to is a no-op.
    pub fn publish(&self, topic: &str, payload: impl Into<Arc<[u8]>>) -> usize {
        let sequence = Sequence(self.next_sequence.fetch_add(1, Ordering::Relaxed));
        self.published.fetch_add(1, Ordering::Relaxed);

        let reached = {
            let topics = self.topics.read();
            let Some((key, subs)) = topics.get_key_value(topic) else {
                self.unrouted.fetch_add(1, Ordering::Relaxed);
                trace!(topic, "No subscribers, message discarded");
                return 0;
            };
            let message = Message::new(Arc::clone(key), payload, sequence);
            subs.iter()
                .filter(|sub| sub.deliver(message.clone()))
                .count()
        };

        if reached > 0 {
            self.wakers.notify_all();
        }
        reached
    }

    /// Re-route an existing message, keeping its sequence number.
    pub fn forward(&self, message: &Message) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let reached = {
            let topics = self.topics.read();
            match topics.get(message.topic()) {
                Some(subs) => subs
                    .iter()
                    .filter(|sub| sub.deliver(message.clone()))
                    .count(),
                None => {
                    self.unrouted.fetch_add(1, Ordering::Relaxed);
                    0
                }
            }
        };
        if reached > 0 {
            self.wakers.notify_all();
        }
        reached
    }

    /// Serialise `value` as JSON and publish it.
    pub fn publish_json<T: Serialize>(&self, topic: &str, value: &T) -> Result<usize> {
        let payload = serde_json::to_vec(value)?;
        Ok(self.publish(topic, payload))
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }

    /// Topic names with at least one subscriber, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.read().keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> RouterStats {
        let topics = self.topics.read();
        RouterStats {
            published: self.published.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            topics: topics.len(),
            subscriptions: topics.values().map(Vec::len).sum(),
        }
    }

    /// Give an executor its own wake-up channel.
    pub(crate) fn register_waker(&self) -> Waker {
        self.wakers.register()
    }

    pub(crate) fn unregister_waker(&self, id: u64) {
        self.wakers.unregister(id);
    }

    #[cfg(test)]
    pub(crate) fn waker_count(&self) -> usize {
        self.wakers.senders.read().len()
    }

    /// Wake every registered executor.
    pub(crate) fn wake_all(&self) {
        self.wakers.notify_all();
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new()
    }
}
