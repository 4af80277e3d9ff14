//! Redis-backed queue: LPUSH/BRPOP lists plus a sorted set per queue for
//! delayed retries.
//!
//! BRPOP parks the connection it runs on, so every blocking pop gets a
//! connection of its own. All other commands share one multiplexed
//! connection.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;

use super::{delayed_key, JobQueue};
use crate::error::QueueError;

/// Upper bound of payloads moved by one promotion call.
const PROMOTE_BATCH: usize = 100;

/// Moves due members of the delayed set onto the list atomically.
const PROMOTE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, payload in ipairs(due) do
    redis.call('ZREM', KEYS[1], payload)
    redis.call('LPUSH', KEYS[2], payload)
end
return #due
";

/// Idle connections reserved for blocking pops. A connection is taken out
/// for the duration of one BRPOP and only returned when the call completed.
struct IdleConnections<C> {
    idle: Mutex<Vec<C>>,
}

impl<C> IdleConnections<C> {
    fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> Option<C> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    fn put_back(&self, conn: C) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }

    fn len(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    conn: MultiplexedConnection,
    blocking: Arc<IdleConnections<MultiplexedConnection>>,
}

impl RedisQueue {
    /// Opens the shared multiplexed connection to `url`. Connections for
    /// blocking pops are opened on demand.
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            conn,
            blocking: Arc::new(IdleConnections::new()),
        })
    }

    async fn blocking_connection(&self) -> Result<MultiplexedConnection, QueueError> {
        match self.blocking.take() {
            Some(conn) => Ok(conn),
            None => {
                tracing::debug!("Opening connection for blocking pops");
                Ok(self.client.get_multiplexed_async_connection().await?)
            }
        }
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError> {
        let mut conn = self.blocking_connection().await?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue)
            // 0 would block forever
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        // A failed or cancelled pop drops its connection instead.
        self.blocking.put_back(conn);
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn list_all(&self, queue: &str) -> Result<Vec<String>, QueueError> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(queue)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        Ok(items)
    }

    async fn remove(&self, queue: &str, payload: &str) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let removed: usize = redis::cmd("LREM")
            .arg(queue)
            .arg(1)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn schedule(
        &self,
        queue: &str,
        payload: &str,
        ready_at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(delayed_key(queue))
            .arg(ready_at.timestamp_millis())
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn promote_due(&self, queue: &str, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let moved: usize = redis::Script::new(PROMOTE_SCRIPT)
            .key(delayed_key(queue))
            .key(queue)
            .arg(now.timestamp_millis())
            .arg(PROMOTE_BATCH)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(QueueError::Unavailable(format!(
                "unexpected PING reply '{}'",
                pong
            )));
        }
        Ok(())
    }
}
