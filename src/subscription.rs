//! Subscriptions: a topic, a bounded queue and a callback, owned by one node.

use crate::config::SubscriptionConfig;
use crate::error::Result;
use crate::queue::MessageQueue;
use crate::router::TopicRouter;
use crate::types::{Message, SubscriptionId};
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace};

/// User callback invoked once per delivered message.
pub type Callback = Box<dyn Fn(&Message) + Send + Sync>;

/// A node's owned subscriptions.
pub(crate) type SubscriptionList = Mutex<Vec<Arc<Subscription>>>;

/// Something the router can route messages into.
pub trait Subscribable: Send + Sync {
    fn id(&self) -> SubscriptionId;

    fn topic(&self) -> &str;

    /// Enqueue a message. Returns false if the subscription no longer
    /// accepts messages.
    fn deliver(&self, message: Message) -> bool;

    fn is_active(&self) -> bool;
}

/// Something the executor can drive one message at a time.
pub trait Runnable: Send + Sync {
    fn has_pending(&self) -> bool;

    /// Dequeue at most one message and run the callback on it.
    fn execute_one(&self) -> Dispatch;
}

/// Outcome of a single `execute_one` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing pending, or the subscription is destroyed.
    Idle,
    /// The callback ran to completion.
    Delivered,
    /// The callback panicked. The message is consumed.
    Failed,
}

/// Counters for one subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    pub delivered: u64,
    pub dropped: u64,
    pub failed: u64,
    pub pending: usize,
}

pub struct Subscription {
    id: SubscriptionId,
    topic: Arc<str>,
    node: String,
    queue: MessageQueue,
    callback: Callback,
    active: AtomicBool,
    /// Serialises callback execution against `destroy`. Re-entrant so a
    /// callback may destroy its own subscription.
    gate: ReentrantMutex<()>,
    delivered: AtomicU64,
    failed: AtomicU64,
    router: Weak<TopicRouter>,
    owner: Weak<SubscriptionList>,
}

impl Subscription {
    /// Allocate the queue and register with the router.
    pub(crate) fn create(
        id: SubscriptionId,
        topic: &str,
        node: &str,
        config: &SubscriptionConfig,
        callback: Callback,
        router: &Arc<TopicRouter>,
        owner: Weak<SubscriptionList>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let subscription = Arc::new(Self {
            id,
            topic: Arc::from(topic),
            node: node.to_string(),
            queue: MessageQueue::new(config.history_depth)?,
            callback,
            active: AtomicBool::new(true),
            gate: ReentrantMutex::new(()),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            router: Arc::downgrade(router),
            owner,
        });

        router.register(Arc::clone(&subscription) as Arc<dyn Subscribable>);
        debug!(
            subscription = %id,
            topic,
            node,
            depth = config.history_depth,
            "Subscription created"
        );
        Ok(subscription)
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn node_name(&self) -> &str {
        &self.node
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.queue.dropped_count(),
            failed: self.failed.load(Ordering::Relaxed),
            pending: self.queue.peek_depth(),
        }
    }

    /// Unregister and discard pending messages.
    ///
    /// Once this returns no callback will start for this subscription. If a
    /// callback is running on another thread, this waits for it to finish.
    /// Returns false if the subscription was already destroyed.
    pub fn destroy(&self) -> bool {
        let _gate = self.gate.lock();
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(router) = self.router.upgrade() {
            router.unregister(&self.topic, self.id);
        }
        let discarded = self.queue.clear();
        if let Some(owner) = self.owner.upgrade() {
            // Drop the node's reference outside its lock.
            let released = {
                let mut subs = owner.lock();
                subs.iter()
                    .position(|s| s.id == self.id)
                    .map(|pos| subs.remove(pos))
            };
            drop(released);
        }
        debug!(
            subscription = %self.id,
            topic = %self.topic,
            node = %self.node,
            discarded,
            "Subscription destroyed"
        );
        true
    }
}

impl Subscribable for Subscription {
    fn id(&self) -> SubscriptionId {
        self.id
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn deliver(&self, message: Message) -> bool {
        if !self.is_active() {
            return false;
        }
        if let Some(evicted) = self.queue.enqueue(message) {
            trace!(
                subscription = %self.id,
                topic = %self.topic,
                capacity = self.queue.capacity(),
                sequence = ?evicted.sequence(),
                "Queue full, dropped oldest message"
            );
        }
        true
    }

    fn is_active(&self) -> bool {
        Subscription::is_active(self)
    }
}

impl Runnable for Subscription {
    fn has_pending(&self) -> bool {
        self.is_active() && !self.queue.is_empty()
    }

    fn execute_one(&self) -> Dispatch {
        let _gate = self.gate.lock();
        if !self.is_active() {
            return Dispatch::Idle;
        }
        let Ok(message) = self.queue.dequeue() else {
            return Dispatch::Idle;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(&message))) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Dispatch::Delivered
            }
            Err(payload) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    subscription = %self.id,
                    topic = %self.topic,
                    node = %self.node,
                    sequence = ?message.sequence(),
                    published_at = message.published_at().0,
                    panic = %panic_message(payload.as_ref()),
                    "Subscription callback panicked"
                );
                Dispatch::Failed
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Caller-side view of a subscription owned by a node.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<Subscription>,
}

impl SubscriptionHandle {
    pub(crate) fn new(inner: Arc<Subscription>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> SubscriptionId {
        self.inner.id()
    }

    pub fn topic(&self) -> &str {
        self.inner.topic()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn stats(&self) -> SubscriptionStats {
        self.inner.stats()
    }

    /// Messages evicted by overflow so far.
    pub fn dropped_count(&self) -> u64 {
        self.inner.queue.dropped_count()
    }

    /// Destroy the subscription. Pending messages are discarded.
    pub fn destroy(&self) -> bool {
        self.inner.destroy()
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.inner.id)
            .field("topic", &self.inner.topic)
            .field("node", &self.inner.node)
            .field("active", &self.inner.is_active())
            .finish()
    }
}
