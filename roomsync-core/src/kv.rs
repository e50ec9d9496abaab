use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::KvError;

pub type KvResult<T> = Result<T, KvError>;

/// The ephemeral KV/Pub-Sub store collaborator (C1, spec §3, §6.1).
///
/// Every mutable per-room field reaches this store through one of three
/// primitives named by spec §5: atomic-set with TTL, atomic-increment, or
/// compare-and-set. No component owns a lock over the store; the store
/// itself is responsible for linearizing concurrent writers to the same
/// key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<()>;
    async fn del(&self, key: &str) -> KvResult<()>;

    /// Sets `key` to `value` only if it does not currently hold `expected`
    /// (or, when `expected` is `None`, only if the key is absent). Returns
    /// whether the set took effect; a `false` return means the caller lost
    /// a race and should re-read and retry.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new_value: String,
        ttl: Option<Duration>,
    ) -> KvResult<bool>;

    async fn hset(&self, key: &str, field: &str, value: String) -> KvResult<()>;
    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<String>>;
    async fn hgetall(&self, key: &str) -> KvResult<Vec<(String, String)>>;
    /// Atomically increments a hash field interpreted as an i64, returning the new value.
    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> KvResult<i64>;
    async fn hdel(&self, key: &str, field: &str) -> KvResult<()>;
    /// Refreshes a hash key's TTL without touching its fields.
    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<()>;

    async fn sadd(&self, key: &str, member: &str) -> KvResult<()>;
    async fn srem(&self, key: &str, member: &str) -> KvResult<()>;
    async fn smembers(&self, key: &str) -> KvResult<Vec<String>>;

    /// Batched get, used by `maxRoomRtt` (§4.2) to fetch every connection's
    /// RTT in one round-trip rather than one call per connection.
    async fn mget(&self, keys: &[String]) -> KvResult<Vec<Option<String>>>;

    /// Broadcasts a payload to a topic. Single-instance deployments may
    /// implement this purely in-process (§6.1); multi-instance deployments
    /// would back it with a real pub/sub fabric.
    async fn publish(&self, topic: &str, payload: String) -> KvResult<()>;

    /// Subscribes to a topic, returning a receiver of future publishes.
    /// Messages published before the subscription is created are not
    /// replayed.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String>;
}
