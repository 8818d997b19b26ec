//! Process-level state: the topic router, node names and the shutdown flag.

use crate::config::ContextConfig;
use crate::error::{BusError, Result};
use crate::node::Node;
use crate::router::TopicRouter;
use crate::types::{NodeId, SubscriptionId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared bootstrap state for a group of nodes and executors.
///
/// Replaces a hidden process-wide registry: everything that routes messages
/// between nodes hangs off an explicit `Arc<Context>`.
pub struct Context {
    config: ContextConfig,
    router: Arc<TopicRouter>,
    node_names: Mutex<HashSet<String>>,
    next_node_id: AtomicU64,
    next_subscription_id: AtomicU64,
    shutdown: AtomicBool,
}

impl Context {
    /// Create a context with default configuration.
    pub fn init() -> Arc<Self> {
        Self::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            router: Arc::new(TopicRouter::new()),
            node_names: Mutex::new(HashSet::new()),
            next_node_id: AtomicU64::new(1),
            next_subscription_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<TopicRouter> {
        &self.router
    }

    /// Create a node. Names are unique among the live nodes of a context.
    pub fn create_node(self: &Arc<Self>, name: &str) -> Result<Arc<Node>> {
        if self.is_shutdown_requested() {
            return Err(BusError::ContextShutdown);
        }
        if !self.node_names.lock().insert(name.to_string()) {
            return Err(BusError::NodeExists(name.to_string()));
        }
        let id = NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed));
        debug!(node = name, id = id.0, "Node created");
        Ok(Arc::new(Node::new(id, name, Arc::clone(self))))
    }

    /// Names of the live nodes, sorted.
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.node_names.lock().iter().cloned().collect();
        names.sort();
        names
    }

    /// Ask every executor on this context to stop.
    pub fn request_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            info!("Shutdown requested");
        }
        self.router.wake_all();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Publish on the context's router without going through a node.
    pub fn publish(&self, topic: &str, payload: impl Into<Arc<[u8]>>) -> usize {
        self.router.publish(topic, payload)
    }

    pub(crate) fn next_subscription_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn release_node_name(&self, name: &str) {
        self.node_names.lock().remove(name);
    }
}
