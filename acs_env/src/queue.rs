//! Message-queue transport abstraction.

use crate::error::EnvError;
use crate::types::QueueMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Connection settings for a queue broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub queue_name: String,

    /// Delay between two polls
    pub poll_interval: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            queue_name: "facility".to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// A source of queue messages polled one at a time.
///
/// # Implementations
///
/// - **Production**: a broker client bound to `QueueSettings`
/// - **Simulation**: `MemoryQueue`, an in-process FIFO
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// Fetches at most one message.
    ///
    /// # Returns
    /// * `Ok(Some(msg))` - A message was taken off the queue
    /// * `Ok(None)` - The queue is currently empty
    /// * `Err(EnvError::QueueError)` - Transport failure
    async fn poll(&self) -> Result<Option<QueueMessage>, EnvError>;

    /// Name of the queue this source reads from.
    fn queue_name(&self) -> &str;
}

/// In-memory FIFO queue, cloneable so producers and the consumer share it.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    name: String,
    inner: Arc<Mutex<MemoryQueueState>>,
}

#[derive(Default)]
struct MemoryQueueState {
    messages: VecDeque<QueueMessage>,
    next_tag: u64,
    closed: bool,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(MemoryQueueState::default())),
        }
    }

    /// Publishes a raw body to the back of the queue.
    pub fn publish(&self, body: impl Into<Vec<u8>>) -> Result<u64, EnvError> {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(EnvError::queue(format!("queue '{}' is closed", self.name)));
        }
        state.next_tag += 1;
        let tag = state.next_tag;
        state.messages.push_back(QueueMessage::new(body, tag));
        Ok(tag)
    }

    /// Closes the queue; subsequent polls fail.
    pub fn close(&self) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
    }

    /// Number of messages waiting.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .messages
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageSource for MemoryQueue {
    async fn poll(&self) -> Result<Option<QueueMessage>, EnvError> {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed && state.messages.is_empty() {
            return Err(EnvError::queue(format!("queue '{}' is closed", self.name)));
        }
        Ok(state.messages.pop_front())
    }

    fn queue_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_is_fifo() {
        let queue = MemoryQueue::new("q");
        queue.publish("a").unwrap();
        queue.publish("b").unwrap();

        let first = queue.poll().await.unwrap().unwrap();
        let second = queue.poll().await.unwrap().unwrap();

        assert_eq!(first.body, b"a");
        assert_eq!(second.body, b"b");
        assert!(first.delivery_tag < second.delivery_tag);
        assert!(queue.poll().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_queue_drains_then_fails() {
        let queue = MemoryQueue::new("q");
        queue.publish("last").unwrap();
        queue.close();

        assert!(queue.publish("late").is_err());
        assert!(queue.poll().await.unwrap().is_some());
        assert!(matches!(queue.poll().await, Err(EnvError::QueueError(_))));
    }
}
