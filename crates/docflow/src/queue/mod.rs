//! Job queue abstraction.
//!
//! Lists behave like Redis lists: `push` adds at the head, `blocking_pop`
//! takes from the tail, so a list is FIFO. Delivery is at-least-once.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;
use crate::error::QueueError;

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError>;

    /// Waits up to `timeout` for the oldest payload. `None` when the wait
    /// expires with the list still empty.
    async fn blocking_pop(&self, queue: &str, timeout: Duration)
        -> Result<Option<String>, QueueError>;

    /// Every payload currently in the list, head first.
    async fn list_all(&self, queue: &str) -> Result<Vec<String>, QueueError>;

    /// Removes one occurrence of `payload`. Returns how many were removed.
    async fn remove(&self, queue: &str, payload: &str) -> Result<usize, QueueError>;

    /// Holds `payload` back until `ready_at`, then [`JobQueue::promote_due`]
    /// moves it onto `queue`.
    async fn schedule(
        &self,
        queue: &str,
        payload: &str,
        ready_at: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// Moves every scheduled payload that is due onto `queue`.
    async fn promote_due(&self, queue: &str, now: DateTime<Utc>) -> Result<usize, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}

/// Key of the sorted set holding delayed payloads for `queue`.
pub fn delayed_key(queue: &str) -> String {
    format!("{}:delayed", queue)
}
