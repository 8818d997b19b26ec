//! # nodebus
//!
//! A process-local publish/subscribe core. Nodes register interest in named
//! topics; published messages are fanned out into bounded per-subscription
//! queues; an executor "spins", draining those queues and invoking the
//! callbacks bound to each subscription.
//!
//! ## Core Concepts
//!
//! - **Context**: Explicit process state (topic router, node names, shutdown flag)
//! - **Node**: Named owner of subscriptions and publishers
//! - **Subscription**: Topic + bounded drop-oldest queue + callback
//! - **Executor**: Cooperative round-robin loop, one message per subscription per pass
//!
//! ## Example
//!
//! ```no_run
//! use nodebus::{Context, Executor};
//! use std::sync::Arc;
//!
//! let ctx = Context::init();
//! let node = ctx.create_node("minimal_subscriber")?;
//! node.create_subscription("topic", 10, |msg| {
//!     tracing::info!("I heard: '{}'", msg.text());
//! })?;
//!
//! let executor = Executor::new(Arc::clone(&ctx));
//! executor.spin(&[node])?;
//! # Ok::<(), nodebus::BusError>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod node;
pub mod publisher;
pub mod queue;
pub mod router;
pub mod subscription;
pub mod types;

// Re-exports
pub use config::{ContextConfig, ExecutorConfig, SubscriptionConfig, DEFAULT_HISTORY_DEPTH};
pub use context::Context;
pub use error::{BusError, Result};
pub use executor::{Executor, ExecutorState, PassSummary};
pub use node::Node;
pub use publisher::Publisher;
pub use queue::MessageQueue;
pub use router::{RouterStats, TopicRouter};
pub use subscription::{
    Callback, Dispatch, Runnable, Subscribable, Subscription, SubscriptionHandle,
    SubscriptionStats,
};
pub use types::*;
