use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::models::task::{TaskKind, TaskPayload};

const KEY_PREFIX: &str = "autoapply";
const CONSUMERS_KEY: &str = "autoapply:consumers";

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

fn pending_key(kind: TaskKind) -> String {
    format!("{KEY_PREFIX}:{kind}:pending")
}

fn processing_key(kind: TaskKind, consumer: &str) -> String {
    format!("{KEY_PREFIX}:{kind}:processing:{consumer}")
}

fn lease_key(consumer: &str) -> String {
    format!("{KEY_PREFIX}:consumer:{consumer}:lease")
}

// Moves one entry back to pending only if it is still in the processing list.
const REQUEUE_SCRIPT: &str = r#"
if redis.call('LREM', KEYS[1], 1, ARGV[1]) > 0 then
    redis.call('LPUSH', KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

/// Task envelope serialized into Redis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedTask {
    pub task_id: Uuid,
    pub payload: TaskPayload,
}

impl QueuedTask {
    pub fn new(task_id: Uuid, payload: TaskPayload) -> Self {
        Self { task_id, payload }
    }

    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }
}

/// A task handed to one consumer. `raw` is the exact queue entry, used to
/// acknowledge precisely this delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task: QueuedTask,
    pub raw: String,
}

/// At-least-once task queue with one lane per task kind.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: &QueuedTask) -> Result<(), QueueError>;

    /// Take the next task of `kind`, keeping it in flight until acked.
    async fn dequeue(&self, kind: TaskKind) -> Result<Option<Delivery>, QueueError>;

    /// Drop a delivery from the in-flight set.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Put an unfinished delivery back on the pending lane.
    async fn requeue(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Return in-flight tasks of `kind` held by consumers whose lease has
    /// expired to the pending lane. Returns the number of tasks moved.
    async fn recover_in_flight(&self, kind: TaskKind) -> Result<u64, QueueError>;

    async fn queue_depth(&self, kind: TaskKind) -> Result<u64, QueueError>;
}

/// Redis-backed async task queue.
///
/// Each kind has one shared pending list, and every consumer (worker process)
/// has its own processing list per kind. Dequeue atomically moves an entry
/// from pending into the consumer's processing list, ack removes it.
///
/// A consumer keeps a lease key alive with [`JobQueue::heartbeat`]. Once the
/// lease expires its processing lists are considered orphaned and
/// [`TaskQueue::recover_in_flight`] hands their entries out again; lists of
/// live consumers are never touched.
pub struct JobQueue {
    client: redis::Client,
    consumer: String,
    lease_ttl: Duration,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        Self::with_lease(redis_url, DEFAULT_LEASE_TTL)
    }

    /// Queue handle with a fresh consumer id and the given lease lifetime.
    pub fn with_lease(redis_url: &str, lease_ttl: Duration) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            consumer: Uuid::new_v4().to_string(),
            lease_ttl: lease_ttl.max(Duration::from_secs(1)),
        })
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Register this consumer and extend its lease. Must be called more
    /// often than the lease lifetime while deliveries are in flight.
    pub async fn heartbeat(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .sadd(CONSUMERS_KEY, &self.consumer)
            .ignore()
            .set_ex(lease_key(&self.consumer), 1, self.lease_ttl.as_secs())
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Drop the lease and deregister. Called on clean shutdown, after every
    /// delivery has been acknowledged or requeued.
    pub async fn release(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .del(lease_key(&self.consumer))
            .ignore()
            .srem(CONSUMERS_KEY, &self.consumer)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for JobQueue {
    async fn enqueue(&self, task: &QueuedTask) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(task).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(pending_key(task.kind()), &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn dequeue(&self, kind: TaskKind) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        let processing = processing_key(kind, &self.consumer);
        let result: Option<String> = conn
            .rpoplpush(pending_key(kind), &processing)
            .await
            .map_err(QueueError::Redis)?;

        let Some(raw) = result else {
            return Ok(None);
        };

        match serde_json::from_str::<QueuedTask>(&raw) {
            Ok(task) => Ok(Some(Delivery { task, raw })),
            Err(e) => {
                // An unreadable entry would be redelivered forever; drop it.
                tracing::error!(kind = %kind, error = %e, entry = %raw, "Discarding malformed queue entry");
                conn.lrem::<_, _, ()>(&processing, 1, &raw)
                    .await
                    .map_err(QueueError::Redis)?;
                Err(QueueError::Serialize(e))
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(
            processing_key(delivery.task.kind(), &self.consumer),
            1,
            &delivery.raw,
        )
        .await
        .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let kind = delivery.task.kind();
        let _moved: i64 = redis::Script::new(REQUEUE_SCRIPT)
            .key(processing_key(kind, &self.consumer))
            .key(pending_key(kind))
            .arg(&delivery.raw)
            .invoke_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn recover_in_flight(&self, kind: TaskKind) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let consumers: Vec<String> = conn.smembers(CONSUMERS_KEY).await.map_err(QueueError::Redis)?;

        let mut moved = 0;
        for consumer in consumers {
            if consumer == self.consumer {
                continue;
            }
            let alive: bool = conn.exists(lease_key(&consumer)).await.map_err(QueueError::Redis)?;
            if alive {
                continue;
            }

            loop {
                let entry: Option<String> = conn
                    .rpoplpush(processing_key(kind, &consumer), pending_key(kind))
                    .await
                    .map_err(QueueError::Redis)?;
                if entry.is_none() {
                    break;
                }
                moved += 1;
            }

            // Forget the consumer once none of its lanes hold anything.
            let mut leftover = 0u64;
            for other in TaskKind::ALL {
                let len: u64 = conn
                    .llen(processing_key(other, &consumer))
                    .await
                    .map_err(QueueError::Redis)?;
                leftover += len;
            }
            if leftover == 0 {
                conn.srem::<_, _, ()>(CONSUMERS_KEY, &consumer)
                    .await
                    .map_err(QueueError::Redis)?;
            }
        }
        Ok(moved)
    }

    async fn queue_depth(&self, kind: TaskKind) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(pending_key(kind)).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
