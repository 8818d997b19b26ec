//! Single-threaded cooperative executor ("spin").
//!
//! Each pass visits every live subscription of every attached node in a
//! fixed order and dispatches at most one message to each, so a busy topic
//! cannot starve a quiet one. Callbacks run synchronously on the spinning
//! thread: a slow callback delays every other subscription on the same
//! executor, and a callback that never returns stalls it. Neither is masked.

use crate::config::ExecutorConfig;
use crate::context::Context;
use crate::error::{BusError, Result};
use crate::node::Node;
use crate::router::Waker;
use crate::subscription::{Dispatch, Runnable};
use crate::types::NodeId;
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Executor lifecycle. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Running,
    Stopped,
}

/// Outcome of one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub delivered: usize,
    pub failed: usize,
}

impl PassSummary {
    /// Messages consumed by the pass, successful or not.
    pub fn handled(&self) -> usize {
        self.delivered + self.failed
    }
}

pub struct Executor {
    context: Arc<Context>,
    config: ExecutorConfig,
    nodes: Mutex<Vec<Arc<Node>>>,
    state: Mutex<ExecutorState>,
    stop_requested: AtomicBool,
    /// Private wake-up channel, signalled by publishes, context shutdown and
    /// `stop`.
    waker: Waker,
}

impl Executor {
    pub fn new(context: Arc<Context>) -> Self {
        let config = context.config().executor.clone();
        Self::with_config(context, config)
    }

    pub fn with_config(context: Arc<Context>, config: ExecutorConfig) -> Self {
        let waker = context.router().register_waker();
        Self {
            context,
            config,
            nodes: Mutex::new(Vec::new()),
            state: Mutex::new(ExecutorState::Idle),
            stop_requested: AtomicBool::new(false),
            waker,
        }
    }

    pub fn state(&self) -> ExecutorState {
        *self.state.lock()
    }

    /// Attach a node. Adding the same node twice is ignored.
    ///
    /// The node must belong to this executor's context, otherwise its
    /// publishes would never wake the executor.
    pub fn add_node(&self, node: Arc<Node>) -> Result<()> {
        self.ensure_same_context(&node)?;
        let mut nodes = self.nodes.lock();
        if nodes.iter().any(|n| n.id() == node.id()) {
            warn!(node = node.name(), "Node already attached to executor");
            return Ok(());
        }
        debug!(node = node.name(), "Node attached to executor");
        nodes.push(node);
        Ok(())
    }

    /// Detach a node. Returns false if it was not attached.
    pub fn remove_node(&self, id: NodeId) -> bool {
        let mut nodes = self.nodes.lock();
        let before = nodes.len();
        nodes.retain(|n| n.id() != id);
        nodes.len() != before
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Attach `nodes` and dispatch until [`stop`](Self::stop) is called or
    /// the context requests shutdown.
    ///
    /// Blocks the calling thread. When every queue is empty the loop parks on
    /// its wake-up channel instead of busy-spinning.
    pub fn spin(&self, nodes: &[Arc<Node>]) -> Result<()> {
        for node in nodes {
            self.ensure_same_context(node)?;
        }
        self.enter(ExecutorState::Running)?;
        for node in nodes {
            self.add_node(Arc::clone(node))?;
        }
        debug!(nodes = self.node_count(), "Executor spinning");

        let mut total = 0usize;
        while !self.should_stop() {
            let summary = self.pass();
            total += summary.handled();
            if summary.handled() == 0 && !self.should_stop() {
                self.idle_wait();
            }
        }

        *self.state.lock() = ExecutorState::Stopped;
        debug!(handled = total, "Executor stopped");
        Ok(())
    }

    /// Run exactly one pass on the calling thread.
    pub fn spin_once(&self) -> Result<PassSummary> {
        self.ensure_not_spinning()?;
        Ok(self.pass())
    }

    /// Run passes until one finds every queue empty. Returns the number of
    /// messages handled.
    pub fn spin_some(&self) -> Result<usize> {
        self.ensure_not_spinning()?;
        let mut total = 0;
        loop {
            let handled = self.pass().handled();
            total += handled;
            if handled == 0 || self.should_stop() {
                return Ok(total);
            }
        }
    }

    /// Stop the executor. Callable from any thread, including from inside a
    /// callback. A running spin returns at the next subscription boundary.
    pub fn stop(&self) {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock();
        if *state == ExecutorState::Idle {
            *state = ExecutorState::Stopped;
        }
        drop(state);
        let _ = self.waker.sender.try_send(());
        debug!("Executor stop requested");
    }

    fn enter(&self, next: ExecutorState) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ExecutorState::Stopped => Err(BusError::ExecutorStopped),
            ExecutorState::Running => Err(BusError::AlreadySpinning),
            ExecutorState::Idle => {
                *state = next;
                Ok(())
            }
        }
    }

    fn ensure_not_spinning(&self) -> Result<()> {
        match self.state() {
            ExecutorState::Stopped => Err(BusError::ExecutorStopped),
            ExecutorState::Running => Err(BusError::AlreadySpinning),
            ExecutorState::Idle => Ok(()),
        }
    }

    fn ensure_same_context(&self, node: &Node) -> Result<()> {
        if Arc::ptr_eq(node.context(), &self.context) {
            Ok(())
        } else {
            Err(BusError::ForeignNode(node.name().to_string()))
        }
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire) || self.context.is_shutdown_requested()
    }

    /// Snapshot the work items of every live node, pruning dead nodes.
    fn collect_runnables(&self) -> Vec<Arc<dyn Runnable>> {
        let mut nodes = self.nodes.lock();
        nodes.retain(|n| n.is_active());
        nodes.iter().flat_map(|n| n.runnables()).collect()
    }

    fn pass(&self) -> PassSummary {
        let mut summary = PassSummary::default();
        for runnable in self.collect_runnables() {
            if self.should_stop() {
                break;
            }
            match runnable.execute_one() {
                Dispatch::Delivered => summary.delivered += 1,
                Dispatch::Failed => summary.failed += 1,
                Dispatch::Idle => {}
            }
        }
        summary
    }

    fn idle_wait(&self) {
        let idle_wait = self.config.idle_wait();
        if let Err(RecvTimeoutError::Timeout) = self.waker.receiver.recv_timeout(idle_wait) {
            trace!("Idle wait elapsed");
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.context.router().unregister_waker(self.waker.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_spin_once_delivers_one_per_subscription() {
        let ctx = Context::init();
        let node = ctx.create_node("n").unwrap();
        node.create_subscription("a", 10, |_| {}).unwrap();
        node.create_subscription("b", 10, |_| {}).unwrap();
        for _ in 0..3 {
            ctx.publish("a", b"x".to_vec());
        }
        ctx.publish("b", b"y".to_vec());

        let executor = Executor::new(Arc::clone(&ctx));
        executor.add_node(Arc::clone(&node)).unwrap();

        assert_eq!(executor.spin_once().unwrap().delivered, 2);
        assert_eq!(executor.spin_once().unwrap().delivered, 1);
        assert_eq!(executor.spin_some().unwrap(), 1);
        assert_eq!(executor.spin_once().unwrap().handled(), 0);
        assert_eq!(executor.state(), ExecutorState::Idle);
    }

    #[test]
    fn test_stop_before_spin_is_terminal() {
        let ctx = Context::init();
        let executor = Executor::new(ctx);
        executor.stop();
        assert_eq!(executor.state(), ExecutorState::Stopped);
        assert!(matches!(executor.spin(&[]), Err(BusError::ExecutorStopped)));
        assert!(matches!(executor.spin_once(), Err(BusError::ExecutorStopped)));
    }

    #[test]
    fn test_stop_wakes_idle_spin() {
        let ctx = Context::init();
        let executor = Arc::new(Executor::with_config(
            ctx,
            ExecutorConfig { idle_wait_ms: 60_000 },
        ));

        let spinner = {
            let executor = Arc::clone(&executor);
            thread::spawn(move || executor.spin(&[]))
        };
        while executor.state() != ExecutorState::Running {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(executor.spin_once(), Err(BusError::AlreadySpinning)));

        executor.stop();
        spinner.join().unwrap().unwrap();
        assert_eq!(executor.state(), ExecutorState::Stopped);
    }

    #[test]
    fn test_shutdown_wakes_every_idle_executor() {
        let ctx = Context::init();
        let slow = ExecutorConfig { idle_wait_ms: 60_000 };
        let executors: Vec<Arc<Executor>> = (0..2)
            .map(|_| Arc::new(Executor::with_config(Arc::clone(&ctx), slow.clone())))
            .collect();

        let spinners: Vec<_> = executors
            .iter()
            .map(|executor| {
                let executor = Arc::clone(executor);
                thread::spawn(move || executor.spin(&[]))
            })
            .collect();
        for executor in &executors {
            while executor.state() != ExecutorState::Running {
                thread::sleep(Duration::from_millis(1));
            }
        }
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        ctx.request_shutdown();
        for spinner in spinners {
            spinner.join().unwrap().unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        for executor in &executors {
            assert_eq!(executor.state(), ExecutorState::Stopped);
        }
    }

    #[test]
    fn test_nodes_from_another_context_rejected() {
        let ctx = Context::init();
        let other = Context::init();
        let stranger = other.create_node("stranger").unwrap();
        let executor = Executor::new(Arc::clone(&ctx));

        assert!(matches!(
            executor.add_node(Arc::clone(&stranger)),
            Err(BusError::ForeignNode(ref name)) if name == "stranger"
        ));
        assert!(matches!(
            executor.spin(&[Arc::clone(&stranger)]),
            Err(BusError::ForeignNode(_))
        ));
        assert_eq!(executor.state(), ExecutorState::Idle);
        assert_eq!(executor.node_count(), 0);
    }

    #[test]
    fn test_dropped_executor_unregisters_waker() {
        let ctx = Context::init();
        let first = Executor::new(Arc::clone(&ctx));
        let second = Executor::new(Arc::clone(&ctx));
        assert_eq!(ctx.router().waker_count(), 2);

        drop(first);
        assert_eq!(ctx.router().waker_count(), 1);
        ctx.request_shutdown();
        assert!(second.waker.receiver.try_recv().is_ok());
    }

    #[test]
    fn test_duplicate_and_dead_nodes() {
        let ctx = Context::init();
        let node = ctx.create_node("n").unwrap();
        let executor = Executor::new(Arc::clone(&ctx));
        executor.add_node(Arc::clone(&node)).unwrap();
        executor.add_node(Arc::clone(&node)).unwrap();
        assert_eq!(executor.node_count(), 1);

        node.shutdown();
        executor.spin_once().unwrap();
        assert_eq!(executor.node_count(), 0);
        assert!(!executor.remove_node(node.id()));
    }
}
