//! In-process publisher bound to one topic.

use crate::error::{BusError, Result};
use crate::router::TopicRouter;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Publishes onto a single topic on behalf of a node.
///
/// Stops working once the owning node shuts down.
#[derive(Clone)]
pub struct Publisher {
    topic: Arc<str>,
    node: Arc<str>,
    node_active: Arc<AtomicBool>,
    router: Arc<TopicRouter>,
}

impl Publisher {
    pub(crate) fn new(
        topic: &str,
        node: Arc<str>,
        node_active: Arc<AtomicBool>,
        router: Arc<TopicRouter>,
    ) -> Self {
        Self {
            topic: Arc::from(topic),
            node,
            node_active,
            router,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish raw bytes. Returns the number of subscriptions reached.
    pub fn publish(&self, payload: impl Into<Arc<[u8]>>) -> Result<usize> {
        self.ensure_active()?;
        Ok(self.router.publish(&self.topic, payload))
    }

    pub fn publish_text(&self, text: &str) -> Result<usize> {
        self.publish(text.as_bytes())
    }

    pub fn publish_json<T: Serialize>(&self, value: &T) -> Result<usize> {
        self.ensure_active()?;
        self.router.publish_json(&self.topic, value)
    }

    /// Subscriptions currently listening on this topic.
    pub fn subscriber_count(&self) -> usize {
        self.router.subscriber_count(&self.topic)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.node_active.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BusError::NodeInactive(self.node.to_string()))
        }
    }
}
