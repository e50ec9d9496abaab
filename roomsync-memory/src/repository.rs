use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use async_trait::async_trait;
use roomsync_core::{
    DjHistory, DjHistoryId, MemberRole, NewRoom, RemovalReason, Repository, RepositoryError,
    RepositoryResultExt, Room, RoomId, RoomMember, User, UserId, Vote, VoteSessionId, VoteType,
};

type Result<T> = std::result::Result<T, RepositoryError>;

/// An in-process, mutex-free (dashmap-sharded) `Repository` (§6.1, C2).
/// Stands in for a real SQL-backed implementation — the teacher's own
/// `PgDatabase`/`sqlx` pairing — which is out of scope here; suitable for
/// tests and single-instance runs.
#[derive(Default)]
pub struct MemoryRepository {
    users: DashMap<UserId, User>,
    rooms: DashMap<RoomId, Room>,
    room_codes: DashMap<String, RoomId>,
    members: DashMap<(RoomId, UserId), RoomMember>,
    dj_history: DashMap<RoomId, Vec<DjHistory>>,
    votes: DashMap<(RoomId, UserId, VoteSessionId), Vote>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-only convenience: mints a user outright, bypassing whatever
    /// identity provider a real deployment would register users through.
    pub async fn seed_user(&self, username: &str) -> UserId {
        let id = UserId::new();
        self.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
                display_name: username.to_string(),
            },
        );
        id
    }

    fn set_member_role(&self, room_id: RoomId, user_id: UserId, role: MemberRole) {
        if let Some(mut member) = self.members.get_mut(&(room_id, user_id)) {
            member.role = role;
        }
    }

    /// Closes out the room's currently-seated DJ history row, if any, and
    /// returns the closed row.
    fn close_current_history(&self, room_id: RoomId, reason: RemovalReason) -> Option<DjHistory> {
        let mut history = self.dj_history.entry(room_id).or_default();
        let last = history.last_mut()?;
        if last.removed_at.is_some() {
            return None;
        }
        last.removed_at = Some(Utc::now());
        last.removal_reason = Some(reason);
        Some(last.clone())
    }

    fn open_new_history(&self, room_id: RoomId, user_id: UserId) -> DjHistory {
        let row = DjHistory {
            id: DjHistoryId::new(),
            room_id,
            user_id,
            became_at: Utc::now(),
            removed_at: None,
            removal_reason: None,
        };
        self.dj_history.entry(room_id).or_default().push(row.clone());
        row
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn user_by_id(&self, user_id: UserId) -> Result<User> {
        self.users
            .get(&user_id)
            .map(|u| u.clone())
            .ok_or_else(|| RepositoryError::NotFound { resource: "user", identifier: user_id.to_string() })
    }

    async fn find_room_by_code(&self, code: &str) -> Result<Room> {
        let room_id = self
            .room_codes
            .get(code)
            .map(|id| *id)
            .ok_or_else(|| RepositoryError::NotFound { resource: "room", identifier: code.to_string() })?;
        self.room_by_id(room_id).await
    }

    async fn room_by_id(&self, room_id: RoomId) -> Result<Room> {
        self.rooms
            .get(&room_id)
            .map(|r| r.clone())
            .ok_or_else(|| RepositoryError::NotFound { resource: "room", identifier: room_id.to_string() })
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<Room> {
        self.find_room_by_code(&new_room.room_code)
            .await
            .conflict_or_ok("room", "room_code", &new_room.room_code)?;

        let room = Room {
            id: RoomId::new(),
            room_code: new_room.room_code.clone(),
            owner_id: new_room.owner_id,
            settings: new_room.settings,
        };

        self.rooms.insert(room.id, room.clone());
        self.room_codes.insert(new_room.room_code, room.id);
        Ok(room)
    }

    async fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool> {
        Ok(self.members.contains_key(&(room_id, user_id)))
    }

    async fn is_owner(&self, room_id: RoomId, user_id: UserId) -> Result<bool> {
        Ok(self.room_by_id(room_id).await?.owner_id == user_id)
    }

    async fn count_members(&self, room_id: RoomId) -> Result<u32> {
        Ok(self.members.iter().filter(|e| e.key().0 == room_id).count() as u32)
    }

    async fn members(&self, room_id: RoomId) -> Result<Vec<RoomMember>> {
        Ok(self.members.iter().filter(|e| e.key().0 == room_id).map(|e| e.value().clone()).collect())
    }

    async fn add_member(&self, room_id: RoomId, user_id: UserId) -> Result<RoomMember> {
        let room = self.room_by_id(room_id).await?;
        let role = if room.owner_id == user_id { MemberRole::Owner } else { MemberRole::Listener };

        let member = RoomMember { room_id, user_id, role };
        self.members.insert((room_id, user_id), member.clone());
        Ok(member)
    }

    async fn remove_member(&self, room_id: RoomId, user_id: UserId) -> Result<()> {
        self.members.remove(&(room_id, user_id));
        Ok(())
    }

    async fn current_dj_history_row(&self, room_id: RoomId) -> Result<Option<DjHistory>> {
        Ok(self
            .dj_history
            .get(&room_id)
            .and_then(|rows| rows.last().filter(|row| row.removed_at.is_none()).cloned()))
    }

    async fn record_vote(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        vote_session_id: VoteSessionId,
        vote_type: VoteType,
        target_user_id: Option<UserId>,
    ) -> Result<()> {
        match self.votes.entry((room_id, voter_id, vote_session_id)) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict {
                resource: "vote",
                field: "voter_id",
                value: voter_id.to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(Vote {
                    room_id,
                    voter_id,
                    vote_type,
                    target_user_id,
                    vote_session_id,
                });
                Ok(())
            }
        }
    }

    async fn apply_election_outcome(&self, room_id: RoomId, winner_id: UserId) -> Result<DjHistory> {
        if let Some(closed) = self.close_current_history(room_id, RemovalReason::Vote) {
            self.set_member_role(room_id, closed.user_id, MemberRole::Listener);
        }
        self.set_member_role(room_id, winner_id, MemberRole::Dj);
        Ok(self.open_new_history(room_id, winner_id))
    }

    async fn apply_mutiny_outcome(&self, room_id: RoomId, removed_dj_id: UserId) -> Result<()> {
        self.close_current_history(room_id, RemovalReason::Mutiny);
        self.set_member_role(room_id, removed_dj_id, MemberRole::Listener);
        Ok(())
    }

    async fn apply_randomize_dj(&self, room_id: RoomId, new_dj_id: UserId) -> Result<DjHistory> {
        if let Some(closed) = self.close_current_history(room_id, RemovalReason::Randomize) {
            self.set_member_role(room_id, closed.user_id, MemberRole::Listener);
        }
        self.set_member_role(room_id, new_dj_id, MemberRole::Dj);
        Ok(self.open_new_history(room_id, new_dj_id))
    }

    async fn apply_dj_removal(&self, room_id: RoomId, removed_dj_id: UserId, reason: RemovalReason) -> Result<()> {
        self.close_current_history(room_id, reason);
        self.set_member_role(room_id, removed_dj_id, MemberRole::Listener);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_core::RoomSettings;

    async fn room_with_owner() -> (MemoryRepository, UserId, RoomId) {
        let repository = MemoryRepository::new();
        let owner = repository.seed_user("owner").await;
        let room = repository
            .create_room(NewRoom { room_code: "abcd".into(), owner_id: owner, settings: RoomSettings::default() })
            .await
            .unwrap();
        repository.add_member(room.id, owner).await.unwrap();
        (repository, owner, room.id)
    }

    #[tokio::test]
    async fn duplicate_room_code_is_a_conflict() {
        let (repository, owner, _room_id) = room_with_owner().await;
        let result = repository
            .create_room(NewRoom { room_code: "abcd".into(), owner_id: owner, settings: RoomSettings::default() })
            .await;
        assert!(matches!(result, Err(RepositoryError::Conflict { .. })));
    }

    #[tokio::test]
    async fn election_outcome_closes_the_previous_dj_and_opens_a_new_row() {
        let (repository, owner, room_id) = room_with_owner().await;
        let challenger = repository.seed_user("challenger").await;
        repository.add_member(room_id, challenger).await.unwrap();

        repository.apply_election_outcome(room_id, owner).await.unwrap();
        let first = repository.current_dj_history_row(room_id).await.unwrap().unwrap();
        assert_eq!(first.user_id, owner);

        repository.apply_election_outcome(room_id, challenger).await.unwrap();
        let second = repository.current_dj_history_row(room_id).await.unwrap().unwrap();
        assert_eq!(second.user_id, challenger);
    }

    #[tokio::test]
    async fn mutiny_outcome_clears_the_seat_with_no_replacement() {
        let (repository, owner, room_id) = room_with_owner().await;
        repository.apply_election_outcome(room_id, owner).await.unwrap();
        repository.apply_mutiny_outcome(room_id, owner).await.unwrap();

        assert!(repository.current_dj_history_row(room_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_vote_in_the_same_session_is_a_conflict() {
        let (repository, owner, room_id) = room_with_owner().await;
        let session_id = VoteSessionId::new();

        repository.record_vote(room_id, owner, session_id, VoteType::DjElection, Some(owner)).await.unwrap();
        let result = repository.record_vote(room_id, owner, session_id, VoteType::DjElection, Some(owner)).await;

        assert!(matches!(result, Err(RepositoryError::Conflict { .. })));
    }
}
