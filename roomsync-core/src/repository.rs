use async_trait::async_trait;

use crate::{
    DjHistory, NewRoom, RemovalReason, Room, RoomId, RoomMember, RepositoryError, User, UserId,
};

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Helper to turn an existence probe into a typed conflict, mirroring the
/// teacher's `DatabaseResult::conflict_or_ok`.
pub trait RepositoryResultExt<T> {
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str) -> Result<()>;
}

impl<T> RepositoryResultExt<T> for Result<T> {
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str) -> Result<()> {
        match self {
            Ok(_) => Err(RepositoryError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(RepositoryError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// The durable entities collaborator (C2, spec §3, §6.1). Core only reads
/// and writes through this interface; a real deployment would back it with
/// a SQL store the way the teacher backs its `Database` trait with
/// `PgDatabase`/`sqlx` — out of scope here per spec §1.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn user_by_id(&self, user_id: UserId) -> Result<User>;

    async fn find_room_by_code(&self, code: &str) -> Result<Room>;
    async fn room_by_id(&self, room_id: RoomId) -> Result<Room>;
    async fn create_room(&self, new_room: NewRoom) -> Result<Room>;

    async fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool>;
    async fn is_owner(&self, room_id: RoomId, user_id: UserId) -> Result<bool>;
    async fn count_members(&self, room_id: RoomId) -> Result<u32>;
    async fn members(&self, room_id: RoomId) -> Result<Vec<RoomMember>>;
    async fn add_member(&self, room_id: RoomId, user_id: UserId) -> Result<RoomMember>;
    async fn remove_member(&self, room_id: RoomId, user_id: UserId) -> Result<()>;

    async fn current_dj_history_row(&self, room_id: RoomId) -> Result<Option<DjHistory>>;

    /// Records a cast vote row. Uniqueness of `(room_id, voter_id, vote_session_id)`
    /// is the durable backstop for I3, enforced even under concurrent retries.
    async fn record_vote(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        vote_session_id: crate::VoteSessionId,
        vote_type: crate::VoteType,
        target_user_id: Option<UserId>,
    ) -> Result<()>;

    /// Atomically applies a DJ-election outcome: closes out the previous
    /// DJ's history row (if any) with `removal_reason = vote`, opens a new
    /// one for the winner. All in one transaction scope (§5).
    async fn apply_election_outcome(&self, room_id: RoomId, winner_id: UserId) -> Result<DjHistory>;

    /// Atomically applies a passed mutiny: closes out the removed DJ's
    /// history row with `removal_reason = mutiny`.
    async fn apply_mutiny_outcome(&self, room_id: RoomId, removed_dj_id: UserId) -> Result<()>;

    /// Atomically applies an owner-initiated randomize-DJ transition.
    async fn apply_randomize_dj(&self, room_id: RoomId, new_dj_id: UserId) -> Result<DjHistory>;

    /// Clears the current DJ seat without a replacement, e.g. on disconnect
    /// (Open Question #1) or voluntary step-down.
    async fn apply_dj_removal(
        &self,
        room_id: RoomId,
        removed_dj_id: UserId,
        reason: RemovalReason,
    ) -> Result<()>;
}
