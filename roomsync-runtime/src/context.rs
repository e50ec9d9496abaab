use std::sync::Arc;

use roomsync_core::{Broadcaster, Config, KeyValueStore, Repository, RoomEvent, RoomId, UserId};

use crate::keys;

/// Shared handle passed to every runtime component, mirroring the
/// teacher's `CollabContext`: access to shared state and the ability to
/// broadcast, without any component holding a direct reference to the
/// Gateway (spec §9's cyclic-dependency note).
#[derive(Clone)]
pub struct RuntimeContext {
    pub kv: Arc<dyn KeyValueStore>,
    pub repository: Arc<dyn Repository>,
    pub config: Arc<Config>,
    broadcaster: Broadcaster,
}

impl RuntimeContext {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        repository: Arc<dyn Repository>,
        config: Config,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            kv,
            repository,
            config: Arc::new(config),
            broadcaster,
        }
    }

    pub fn broadcast(&self, room_id: RoomId, event: RoomEvent) {
        (self.broadcaster)(room_id, event)
    }

    /// §4.1's `isMember` primitive — from the Repository.
    pub async fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool, roomsync_core::RepositoryError> {
        self.repository.is_member(room_id, user_id).await
    }

    /// §4.1's `isOwner` primitive — from the Repository.
    pub async fn is_owner(&self, room_id: RoomId, user_id: UserId) -> Result<bool, roomsync_core::RepositoryError> {
        self.repository.is_owner(room_id, user_id).await
    }

    /// §4.1's `isCurrentDj` primitive.
    pub async fn is_current_dj(&self, room_id: RoomId, user_id: UserId) -> Result<bool, roomsync_core::KvError> {
        Ok(self.current_dj(room_id).await? == Some(user_id))
    }

    /// Returns the current DJ's id, if any is seated. The KV key is the
    /// fast path; on a cold cache (nothing written there yet, or expired)
    /// this falls back to the Repository's `DjHistory` row — the
    /// authoritative source per spec §9's rebuild note — and warms the
    /// cache so later reads skip the Repository round-trip.
    pub async fn current_dj(&self, room_id: RoomId) -> Result<Option<UserId>, roomsync_core::KvError> {
        if let Some(stored) = self.kv.get(&keys::room_dj(room_id)).await? {
            return Ok(roomsync_core::UserId::from_str_opaque(&stored));
        }

        let Ok(Some(row)) = self.repository.current_dj_history_row(room_id).await else {
            return Ok(None);
        };

        self.kv.set(&keys::room_dj(room_id), row.user_id.to_string(), None).await?;
        Ok(Some(row.user_id))
    }
}

/// Returns the current server time as epoch milliseconds. Centralized so
/// every component reads the clock the same way, and so tests can reason
/// about it without reaching into a system call directly.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_millis() as u64
}
