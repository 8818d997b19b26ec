//! Nodes own subscriptions and publishers.

use crate::config::SubscriptionConfig;
use crate::context::Context;
use crate::error::{BusError, Result};
use crate::publisher::Publisher;
use crate::subscription::{Runnable, Subscription, SubscriptionHandle, SubscriptionList};
use crate::types::{Message, NodeId, SubscriptionId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A named participant that registers interest in topics.
///
/// All subscriptions of a node are destroyed when the node shuts down or is
/// dropped. After shutdown every mutating method fails with
/// [`BusError::NodeInactive`].
pub struct Node {
    id: NodeId,
    name: Arc<str>,
    context: Arc<Context>,
    /// Also guards the active flag against concurrent `create_subscription`.
    /// Subscriptions remove themselves from here when destroyed.
    subscriptions: Arc<SubscriptionList>,
    active: Arc<AtomicBool>,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: &str, context: Arc<Context>) -> Self {
        Self {
            id,
            name: Arc::from(name),
            context,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Subscribe to `topic` keeping at most `depth` undelivered messages.
    pub fn create_subscription<F>(
        &self,
        topic: &str,
        depth: usize,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.create_subscription_with(topic, SubscriptionConfig::with_depth(depth), callback)
    }

    pub fn create_subscription_with<F>(
        &self,
        topic: &str,
        config: SubscriptionConfig,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let mut subs = self.subscriptions.lock();
        self.ensure_active()?;

        let subscription = Subscription::create(
            self.context.next_subscription_id(),
            topic,
            &self.name,
            &config,
            Box::new(callback),
            self.context.router(),
            Arc::downgrade(&self.subscriptions),
        )?;
        subs.push(Arc::clone(&subscription));
        Ok(SubscriptionHandle::new(subscription))
    }

    /// Create a publisher for `topic` sharing this node's router.
    pub fn create_publisher(&self, topic: &str) -> Result<Publisher> {
        self.ensure_active()?;
        Ok(Publisher::new(
            topic,
            Arc::clone(&self.name),
            Arc::clone(&self.active),
            Arc::clone(self.context.router()),
        ))
    }

    /// Destroy one subscription. Its pending messages are discarded.
    pub fn destroy_subscription(&self, id: SubscriptionId) -> Result<()> {
        let removed = {
            let mut subs = self.subscriptions.lock();
            self.ensure_active()?;
            let pos = subs
                .iter()
                .position(|s| s.id() == id)
                .ok_or(BusError::SubscriptionNotFound(id))?;
            subs.remove(pos)
        };
        removed.destroy();
        Ok(())
    }

    /// Handles for the live subscriptions, in creation order.
    pub fn subscriptions(&self) -> Vec<SubscriptionHandle> {
        self.subscriptions
            .lock()
            .iter()
            .filter(|s| s.is_active())
            .map(|s| SubscriptionHandle::new(Arc::clone(s)))
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().iter().filter(|s| s.is_active()).count()
    }

    /// Live subscriptions as executor work items.
    pub(crate) fn runnables(&self) -> Vec<Arc<dyn Runnable>> {
        self.subscriptions
            .lock()
            .iter()
            .filter(|s| s.is_active())
            .map(|s| Arc::clone(s) as Arc<dyn Runnable>)
            .collect()
    }

    /// Destroy every subscription and mark the node inactive. Idempotent.
    pub fn shutdown(&self) {
        let owned = {
            let mut subs = self.subscriptions.lock();
            if !self.active.swap(false, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *subs)
        };
        let count = owned.len();
        for sub in owned {
            sub.destroy();
        }
        self.context.release_node_name(&self.name);
        debug!(node = %self.name, subscriptions = count, "Node shut down");
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(BusError::NodeInactive(self.name.to_string()))
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}
