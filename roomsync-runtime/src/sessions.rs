use std::time::Duration;

use log::info;
use roomsync_core::{Auth, ConnectionId, RepositoryError, RoomEvent, RoomId, UserId};
use thiserror::Error;

use crate::{context::RuntimeContext, keys};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection presented an invalid or expired token")]
    Unauthorized,
    #[error("room {0} does not exist")]
    RoomNotFound(String),
    #[error("user is not a member of this room")]
    NotAMember,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Kv(#[from] roomsync_core::KvError),
}

impl roomsync_core::IntoErrorCode for SessionError {
    fn code(&self) -> roomsync_core::ErrorCode {
        use roomsync_core::ErrorCode::*;
        match self {
            Self::Unauthorized => Unauthorized,
            Self::RoomNotFound(_) => NotFound,
            Self::NotAMember => Unauthorized,
            Self::Repository(e) => roomsync_core::IntoErrorCode::code(e),
            Self::Kv(e) => roomsync_core::IntoErrorCode::code(e),
        }
    }
}

/// Authenticates each transport connection, binds identity, and tracks
/// room membership per connection (§4.1, C3). Connection state itself
/// lives in the KV store, keyed by `ConnectionId`, with a 5-minute TTL
/// refreshed on every activity — this registry holds no connection state
/// of its own, the same "thin component over shared state" shape the
/// teacher's `RoomManager` uses over `CollabContext`.
pub struct SessionRegistry {
    context: RuntimeContext,
    auth: std::sync::Arc<dyn Auth>,
}

struct ConnectionRecord {
    user_id: UserId,
    username: String,
}

impl SessionRegistry {
    pub fn new(context: RuntimeContext, auth: std::sync::Arc<dyn Auth>) -> Self {
        Self { context, auth }
    }

    fn connection_ttl(&self) -> Duration {
        Duration::from_secs(self.context.config.connection_ttl_s)
    }

    /// Validates the bearer token presented on the initial handshake and
    /// binds `{connection_id -> (user_id, username)}` for the connection's
    /// lifetime. The token is only ever read from the handshake message,
    /// never from a URL parameter (§4.1).
    pub async fn handshake(&self, token: &str) -> Result<ConnectionId, SessionError> {
        let user_id = self
            .auth
            .verify_token(token)
            .await
            .map_err(|_| SessionError::Unauthorized)?;

        let user = self.context.repository.user_by_id(user_id).await?;

        let connection_id = ConnectionId::new();
        let record = ConnectionRecord {
            user_id,
            username: user.username,
        };

        self.store_connection(connection_id, &record).await?;

        info!("Connection {connection_id} bound to user {}", user.username);
        Ok(connection_id)
    }

    async fn store_connection(&self, id: ConnectionId, record: &ConnectionRecord) -> Result<(), SessionError> {
        let key = keys::connection(id);
        let ttl = self.connection_ttl();

        self.context.kv.hset(&key, "user_id", record.user_id.to_string()).await?;
        self.context.kv.hset(&key, "username", record.username.clone()).await?;
        self.context.kv.expire(&key, ttl).await?;
        Ok(())
    }

    /// Refreshes a connection's TTL; called on every inbound event.
    pub async fn touch(&self, id: ConnectionId) -> Result<(), SessionError> {
        self.context.kv.expire(&keys::connection(id), self.connection_ttl()).await?;
        Ok(())
    }

    pub async fn user_of(&self, id: ConnectionId) -> Result<UserId, SessionError> {
        let raw = self
            .context
            .kv
            .hget(&keys::connection(id), "user_id")
            .await?
            .ok_or(SessionError::Unauthorized)?;

        UserId::from_str_opaque(&raw).ok_or(SessionError::Unauthorized)
    }

    /// Joins a connection to a room. Idempotent: joining twice does not
    /// duplicate membership in the connection set (a KV set add of an
    /// already-present member is a no-op).
    pub async fn join_room(&self, connection_id: ConnectionId, room_id: RoomId) -> Result<(), SessionError> {
        let user_id = self.user_of(connection_id).await?;

        if !self.context.is_member(room_id, user_id).await? {
            return Err(SessionError::NotAMember);
        }

        self.context.kv.sadd(&keys::room_connections(room_id), &connection_id.to_string()).await?;
        self.context.kv.sadd(&keys::connection_rooms(connection_id), &room_id.to_string()).await?;

        self.context.broadcast(room_id, RoomEvent::UserJoined { user_id });
        Ok(())
    }

    pub async fn leave_room(&self, connection_id: ConnectionId, room_id: RoomId) -> Result<(), SessionError> {
        let user_id = self.user_of(connection_id).await?;

        self.context.kv.srem(&keys::room_connections(room_id), &connection_id.to_string()).await?;
        self.context.kv.srem(&keys::connection_rooms(connection_id), &room_id.to_string()).await?;

        self.context.broadcast(room_id, RoomEvent::UserLeft { user_id });
        Ok(())
    }

    /// Removes a connection from every room it had joined. Returns the
    /// rooms it was a member of, so the Gateway's caller (or this
    /// registry itself, via `on_disconnect`) can decide whether the
    /// connection's user was that room's DJ.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<Vec<RoomId>, SessionError> {
        let joined_raw = self.context.kv.smembers(&keys::connection_rooms(connection_id)).await?;
        let user_id = self.user_of(connection_id).await?;

        let mut rooms = Vec::with_capacity(joined_raw.len());
        for raw in joined_raw {
            if let Some(room_id) = RoomId::from_str_opaque(&raw) {
                self.context.kv.srem(&keys::room_connections(room_id), &connection_id.to_string()).await?;
                self.context.broadcast(room_id, RoomEvent::UserLeft { user_id });
                self.clear_dj_if_disconnected(room_id, user_id).await?;
                rooms.push(room_id);
            }
        }

        self.context.kv.del(&keys::connection_rooms(connection_id)).await?;
        self.context.kv.del(&keys::connection(connection_id)).await?;

        Ok(rooms)
    }

    /// Open Question #1's recorded decision: a room's `clear_dj_on_disconnect`
    /// setting decides whether the seat is cleared when its DJ drops. No
    /// cooldown is set either way, since disconnect is neither a vote loss
    /// nor a choice the DJ made.
    async fn clear_dj_if_disconnected(&self, room_id: RoomId, user_id: UserId) -> Result<(), SessionError> {
        if !self.context.is_current_dj(room_id, user_id).await? {
            return Ok(());
        }

        let room = self.context.repository.room_by_id(room_id).await?;
        if !room.settings.clear_dj_on_disconnect {
            return Ok(());
        }

        self.context.kv.del(&keys::room_dj(room_id)).await?;
        self.context
            .repository
            .apply_dj_removal(room_id, user_id, roomsync_core::RemovalReason::Disconnect)
            .await?;
        self.context.broadcast(room_id, RoomEvent::DjCleared { reason: "disconnect" });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roomsync_core::{AuthError, Config, NewRoom, Repository as _};
    use roomsync_memory::{MemoryRepository, MemoryStore};
    use std::sync::Arc;

    struct StaticAuth(UserId);

    #[async_trait]
    impl Auth for StaticAuth {
        async fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
            if token == "valid" {
                Ok(self.0)
            } else {
                Err(AuthError::InvalidToken)
            }
        }
    }

    async fn test_context() -> (RuntimeContext, UserId, RoomId) {
        let repository = Arc::new(MemoryRepository::new());
        let owner = repository.seed_user("alice").await;
        let room = repository
            .create_room(NewRoom {
                room_code: "abc123".into(),
                owner_id: owner,
                settings: Default::default(),
            })
            .await
            .expect("room is created");
        repository.add_member(room.id, owner).await.expect("owner joins own room");

        let kv = Arc::new(MemoryStore::new());
        let context = RuntimeContext::new(kv, repository, Config::default(), Arc::new(|_, _| {}));
        (context, owner, room.id)
    }

    #[tokio::test]
    async fn handshake_rejects_bad_token() {
        let (context, owner, _room) = test_context().await;
        let registry = SessionRegistry::new(context, Arc::new(StaticAuth(owner)));

        let result = registry.handshake("garbage").await;
        assert!(matches!(result, Err(SessionError::Unauthorized)));
    }

    #[tokio::test]
    async fn join_is_idempotent_for_an_already_joined_connection() {
        let (context, owner, room_id) = test_context().await;
        let registry = SessionRegistry::new(context.clone(), Arc::new(StaticAuth(owner)));

        let connection_id = registry.handshake("valid").await.expect("handshake succeeds");
        registry.join_room(connection_id, room_id).await.expect("first join succeeds");
        registry.join_room(connection_id, room_id).await.expect("second join succeeds without error");

        let members = context.kv.smembers(&keys::room_connections(room_id)).await.unwrap();
        assert_eq!(members.len(), 1, "joining twice must not duplicate the connection in the room's set");
    }

    #[tokio::test]
    async fn disconnect_removes_from_every_joined_room() {
        let (context, owner, room_id) = test_context().await;
        let registry = SessionRegistry::new(context.clone(), Arc::new(StaticAuth(owner)));

        let connection_id = registry.handshake("valid").await.expect("handshake succeeds");
        registry.join_room(connection_id, room_id).await.expect("join succeeds");

        let rooms = registry.disconnect(connection_id).await.expect("disconnect succeeds");
        assert_eq!(rooms, vec![room_id]);

        let members = context.kv.smembers(&keys::room_connections(room_id)).await.unwrap();
        assert!(members.is_empty(), "disconnected connection must be removed from the room set");
    }
}
