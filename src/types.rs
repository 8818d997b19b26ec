//! Core types shared by the queue, router and executor.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a subscription within a context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a node within a context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Publish order, assigned by the router.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. Clocks before the epoch read as zero.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// An immutable message delivered on a topic.
///
/// Clones share the topic and payload allocations, so fanning a message out
/// to many queues costs one reference count bump per queue. The payload is
/// dropped once the last queue (and callback) lets go of it.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    topic: Arc<str>,
    payload: Arc<[u8]>,
    sequence: Sequence,
    published_at: Timestamp,
}

impl Message {
    /// Build a message. Normally only the router does this; tests and
    /// transports may construct messages directly.
    pub fn new(topic: impl Into<Arc<str>>, payload: impl Into<Arc<[u8]>>, sequence: Sequence) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            sequence,
            published_at: Timestamp::now(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub fn published_at(&self) -> Timestamp {
        self.published_at
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Decode a JSON payload.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("topic", &self.topic)
            .field("sequence", &self.sequence)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_and_json_views() {
        let msg = Message::new("chatter", b"hello".to_vec(), Sequence(1));
        assert_eq!(msg.topic(), "chatter");
        assert_eq!(msg.text(), "hello");
        assert!(msg.decode_json::<serde_json::Value>().is_err());

        let body = serde_json::to_vec(&json!({"n": 3})).unwrap();
        let msg = Message::new("numbers", body, Sequence(2));
        let value: serde_json::Value = msg.decode_json().unwrap();
        assert_eq!(value["n"], 3);
    }

    #[test]
    fn test_clone_shares_payload() {
        let msg = Message::new("t", vec![0u8; 64], Sequence(7));
        let copy = msg.clone();
        assert!(std::ptr::eq(msg.payload().as_ptr(), copy.payload().as_ptr()));
        assert_eq!(copy.sequence(), Sequence(7));
    }
}
