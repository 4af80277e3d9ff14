//! In-process queue for tests and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::JobQueue;
use crate::error::QueueError;

#[derive(Default)]
struct Lists {
    ready: HashMap<String, VecDeque<String>>,
    delayed: HashMap<String, Vec<(DateTime<Utc>, String)>>,
}

#[derive(Default)]
pub struct MemoryQueue {
    lists: Mutex<Lists>,
    pushed: Notify,
    unavailable: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a broker outage: every operation fails until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self, queue: &str) -> usize {
        self.lock()
            .map(|l| l.ready.get(queue).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Delayed payloads for `queue` with their due times.
    pub fn delayed(&self, queue: &str) -> Vec<(DateTime<Utc>, String)> {
        self.lock()
            .map(|l| l.delayed.get(queue).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Lists>, QueueError> {
        self.lists
            .lock()
            .map_err(|_| QueueError::Unavailable("queue lock poisoned".to_string()))
    }

    fn check(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn try_pop(&self, queue: &str) -> Result<Option<String>, QueueError> {
        Ok(self.lock()?.ready.get_mut(queue).and_then(VecDeque::pop_back))
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        self.check()?;
        self.lock()?
            .ready
            .entry(queue.to_string())
            .or_default()
            .push_front(payload.to_string());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check()?;
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.try_pop(queue)? {
                return Ok(Some(payload));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn list_all(&self, queue: &str) -> Result<Vec<String>, QueueError> {
        self.check()?;
        Ok(self
            .lock()?
            .ready
            .get(queue)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove(&self, queue: &str, payload: &str) -> Result<usize, QueueError> {
        self.check()?;
        let mut lists = self.lock()?;
        let Some(list) = lists.ready.get_mut(queue) else {
            return Ok(0);
        };
        match list.iter().position(|p| p == payload) {
            Some(index) => {
                list.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn schedule(
        &self,
        queue: &str,
        payload: &str,
        ready_at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.check()?;
        self.lock()?
            .delayed
            .entry(queue.to_string())
            .or_default()
            .push((ready_at, payload.to_string()));
        Ok(())
    }

    async fn promote_due(&self, queue: &str, now: DateTime<Utc>) -> Result<usize, QueueError> {
        self.check()?;
        let mut lists = self.lock()?;
        let Some(delayed) = lists.delayed.get_mut(queue) else {
            return Ok(0);
        };

        let (mut due, pending): (Vec<_>, Vec<_>) =
            delayed.drain(..).partition(|(ready_at, _)| *ready_at <= now);
        *delayed = pending;
        due.sort_by_key(|(ready_at, _)| *ready_at);

        let promoted = due.len();
        let ready = lists.ready.entry(queue.to_string()).or_default();
        for (_, payload) in due {
            ready.push_front(payload);
        }
        drop(lists);

        if promoted > 0 {
            self.pushed.notify_waiters();
        }
        Ok(promoted)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryQueue::new();
        queue.push("q", "a").await.unwrap();
        queue.push("q", "b").await.unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(queue.blocking_pop("q", timeout).await.unwrap().as_deref(), Some("a"));
        assert_eq!(queue.blocking_pop("q", timeout).await.unwrap().as_deref(), Some("b"));
        assert_eq!(queue.blocking_pop("q", timeout).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_pop_times_out() {
        let queue = MemoryQueue::new();
        let started = Instant::now();
        let result = queue.blocking_pop("q", Duration::from_secs(10)).await.unwrap();
        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_blocking_pop_wakes_on_push() {
        let queue = Arc::new(MemoryQueue::new());
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.blocking_pop("q", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push("q", "job").await.unwrap();

        let popped = popper.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("job"));
    }

    #[tokio::test]
    async fn test_list_and_remove_once() {
        let queue = MemoryQueue::new();
        queue.push("dlq", "x").await.unwrap();
        queue.push("dlq", "y").await.unwrap();
        queue.push("dlq", "x").await.unwrap();

        assert_eq!(queue.list_all("dlq").await.unwrap(), vec!["x", "y", "x"]);
        assert_eq!(queue.remove("dlq", "x").await.unwrap(), 1);
        assert_eq!(queue.list_all("dlq").await.unwrap(), vec!["y", "x"]);
        assert_eq!(queue.remove("dlq", "missing").await.unwrap(), 0);
        assert_eq!(queue.remove("other", "x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_schedule_and_promote() {
        let queue = MemoryQueue::new();
        let now = Utc::now();
        queue
            .schedule("q", "later", now + chrono::Duration::seconds(60))
            .await
            .unwrap();
        queue
            .schedule("q", "soon", now - chrono::Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(queue.promote_due("q", now).await.unwrap(), 1);
        assert_eq!(queue.list_all("q").await.unwrap(), vec!["soon"]);
        assert_eq!(queue.delayed("q").len(), 1);

        assert_eq!(
            queue
                .promote_due("q", now + chrono::Duration::seconds(61))
                .await
                .unwrap(),
            1
        );
        assert_eq!(queue.len("q"), 2);
        assert!(queue.delayed("q").is_empty());
    }

    #[tokio::test]
    async fn test_outage() {
        let queue = MemoryQueue::new();
        queue.set_unavailable(true);
        assert!(queue.ping().await.is_err());
        assert!(queue.push("q", "a").await.is_err());
        assert!(queue
            .blocking_pop("q", Duration::from_millis(1))
            .await
            .is_err());

        queue.set_unavailable(false);
        assert!(queue.ping().await.is_ok());
    }
}
