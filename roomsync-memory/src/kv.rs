use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use roomsync_core::{KeyValueStore, KvResult};
use tokio::sync::broadcast;

const PUBSUB_CAPACITY: usize = 256;

/// An in-process `KeyValueStore`, backed by `dashmap` (§6.1, C1). Suitable
/// for a single-instance deployment and for tests; `publish`/`subscribe`
/// fan-out never leaves the process, matching "single-instance deployments
/// may use in-process topics".
#[derive(Default)]
pub struct MemoryStore {
    strings: DashMap<String, String>,
    hashes: DashMap<String, DashMap<String, String>>,
    sets: DashMap<String, DashSet<String>>,
    expirations: DashMap<String, Instant>,
    topics: DashMap<String, broadcast::Sender<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a background sweep that drops expired keys proactively. Call
    /// this once the binary is running inside a tokio runtime; correctness
    /// never depends on it, since every accessor checks expiry lazily on
    /// its own — this only reclaims memory for keys nobody touches again.
    pub fn spawn_reaper(self: &std::sync::Arc<Self>, sweep_interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                store.sweep_expired();
            }
        })
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .expirations
            .iter()
            .filter(|e| *e.value() <= now)
            .map(|e| e.key().clone())
            .collect();

        for key in expired {
            self.purge(&key);
        }
    }

    fn purge(&self, key: &str) {
        self.strings.remove(key);
        self.hashes.remove(key);
        self.sets.remove(key);
        self.expirations.remove(key);
    }

    fn purge_if_expired(&self, key: &str) {
        let expired = self.expirations.get(key).map(|e| *e <= Instant::now()).unwrap_or(false);
        if expired {
            self.purge(key);
        }
    }

    fn set_expiry(&self, key: &str, ttl: Option<Duration>) {
        match ttl {
            Some(ttl) => {
                self.expirations.insert(key.to_string(), Instant::now() + ttl);
            }
            None => {
                self.expirations.remove(key);
            }
        }
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<String> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(PUBSUB_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.purge_if_expired(key);
        Ok(self.strings.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<()> {
        self.strings.insert(key.to_string(), value);
        self.set_expiry(key, ttl);
        Ok(())
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        self.purge(key);
        Ok(())
    }

    async fn compare_and_set(&self, key: &str, expected: Option<&str>, new_value: String, ttl: Option<Duration>) -> KvResult<bool> {
        self.purge_if_expired(key);
        let current = self.strings.get(key).map(|v| v.clone());

        let matches = match (current.as_deref(), expected) {
            (None, None) => true,
            (Some(current), Some(expected)) => current == expected,
            _ => false,
        };

        if !matches {
            return Ok(false);
        }

        self.strings.insert(key.to_string(), new_value);
        self.set_expiry(key, ttl);
        Ok(true)
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> KvResult<()> {
        self.purge_if_expired(key);
        self.hashes.entry(key.to_string()).or_default().insert(field.to_string(), value);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<String>> {
        self.purge_if_expired(key);
        Ok(self.hashes.get(key).and_then(|h| h.get(field).map(|v| v.clone())))
    }

    async fn hgetall(&self, key: &str) -> KvResult<Vec<(String, String)>> {
        self.purge_if_expired(key);
        Ok(self
            .hashes
            .get(key)
            .map(|h| h.iter().map(|e| (e.key().clone(), e.value().clone())).collect())
            .unwrap_or_default())
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> KvResult<i64> {
        self.purge_if_expired(key);
        let hash = self.hashes.entry(key.to_string()).or_default();
        let mut entry = hash.entry(field.to_string()).or_insert_with(|| "0".to_string());
        let current: i64 = entry.parse().unwrap_or(0);
        let updated = current + delta;
        *entry = updated.to_string();
        Ok(updated)
    }

    async fn hdel(&self, key: &str, field: &str) -> KvResult<()> {
        if let Some(hash) = self.hashes.get(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<()> {
        self.set_expiry(key, Some(ttl));
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> KvResult<()> {
        self.purge_if_expired(key);
        self.sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> KvResult<()> {
        if let Some(set) = self.sets.get(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> KvResult<Vec<String>> {
        self.purge_if_expired(key);
        Ok(self.sets.get(key).map(|s| s.iter().map(|m| m.clone()).collect()).unwrap_or_default())
    }

    async fn mget(&self, keys: &[String]) -> KvResult<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    async fn publish(&self, topic: &str, payload: String) -> KvResult<()> {
        let _ = self.topic_sender(topic).send(payload);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        self.topic_sender(topic).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_round_trips() {
        let store = MemoryStore::new();
        store.set("k", "v".into(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_key_reads_as_absent() {
        let store = MemoryStore::new();
        store.set("k", "v".into(), Some(Duration::from_millis(5))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn compare_and_set_rejects_mismatched_expectation() {
        let store = MemoryStore::new();
        store.set("k", "v1".into(), None).await.unwrap();

        let applied = store.compare_and_set("k", Some("wrong"), "v2".into(), None).await.unwrap();
        assert!(!applied);
        assert_eq!(store.get("k").await.unwrap(), Some("v1".to_string()));

        let applied = store.compare_and_set("k", Some("v1"), "v2".into(), None).await.unwrap();
        assert!(applied);
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn hincr_by_accumulates() {
        let store = MemoryStore::new();
        store.hincr_by("h", "f", 1).await.unwrap();
        let result = store.hincr_by("h", "f", 4).await.unwrap();
        assert_eq!(result, 5);
    }

    #[tokio::test]
    async fn sadd_is_idempotent() {
        let store = MemoryStore::new();
        store.sadd("s", "a").await.unwrap();
        store.sadd("s", "a").await.unwrap();
        assert_eq!(store.smembers("s").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_reaches_an_existing_subscriber() {
        let store = MemoryStore::new();
        let mut receiver = store.subscribe("room:1");
        store.publish("room:1", "hello".into()).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap(), "hello");
    }
}
