//! Bounded drop-oldest message queue.

use crate::error::{BusError, Result};
use crate::types::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// FIFO buffer of delivered-but-unprocessed messages.
///
/// One publisher thread and one executor thread may use the queue at the same
/// time. Enqueue never blocks on capacity: when full, the oldest message is
/// evicted to make room.
pub struct MessageQueue {
    items: Mutex<VecDeque<Message>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl MessageQueue {
    /// Create a queue holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BusError::InvalidCapacity(capacity));
        }
        Ok(Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        })
    }

    /// Append a message, returning the evicted one if the queue was full.
    pub fn enqueue(&self, message: Message) -> Option<Message> {
        let mut items = self.items.lock();
        let evicted = if items.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            items.pop_front()
        } else {
            None
        };
        items.push_back(message);
        evicted
    }

    /// Remove and return the oldest message.
    pub fn dequeue(&self) -> Result<Message> {
        self.items.lock().pop_front().ok_or(BusError::Empty)
    }

    /// Number of messages currently held.
    pub fn peek_depth(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total messages evicted by overflow since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard everything pending. Returns how many messages were discarded.
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let n = items.len();
        items.clear();
        n
    }
}
