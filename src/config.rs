//! Configuration for subscriptions, executors and contexts.

use crate::error::{BusError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// History depth used when none is given.
pub const DEFAULT_HISTORY_DEPTH: usize = 10;

/// Per-subscription settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Max undelivered messages kept before the oldest is dropped.
    /// Default: 10
    pub history_depth: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

impl SubscriptionConfig {
    pub fn with_depth(history_depth: usize) -> Self {
        Self { history_depth }
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_depth == 0 {
            return Err(BusError::InvalidCapacity(self.history_depth));
        }
        Ok(())
    }
}

/// Executor settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How long an idle spin waits for a wake-up before re-checking
    /// shutdown flags.
    /// Default: 50ms
    pub idle_wait_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { idle_wait_ms: 50 }
    }
}

impl ExecutorConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

/// Context settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Subscription defaults for nodes of this context.
    pub subscription: SubscriptionConfig,

    pub executor: ExecutorConfig,
}

impl ContextConfig {
    /// Parse a context configuration from JSON. Missing fields use defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ContextConfig = serde_json::from_str(json)?;
        config.subscription.validate()?;
        Ok(config)
    }
}
