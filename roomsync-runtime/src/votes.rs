use std::time::Duration;

use log::info;
use rand::seq::SliceRandom;
use roomsync_core::{RepositoryError, RoomEvent, RoomId, UserId, VoteSessionId, VoteType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{now_ms, RuntimeContext};
use crate::keys;

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("user is not a member of this room")]
    NotAMember,
    #[error("room already has an active vote session")]
    ConcurrentVote,
    #[error("mutiny cooldown is still active for this room")]
    Cooldown,
    #[error("vote session has expired or does not exist")]
    SessionExpired,
    #[error("this voter has already cast a vote in this session")]
    AlreadyVoted,
    #[error("room has no current DJ to mutiny against")]
    NoCurrentDj,
    #[error("only the room owner may do this")]
    NotOwner,
    #[error("this vote type doesn't support that ballot")]
    WrongBallotKind,
    #[error("room has no members to pick from")]
    NoMembers,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Kv(#[from] roomsync_core::KvError),
}

impl roomsync_core::IntoErrorCode for VoteError {
    fn code(&self) -> roomsync_core::ErrorCode {
        use roomsync_core::ErrorCode::*;
        match self {
            Self::NotAMember | Self::NotOwner => Unauthorized,
            Self::ConcurrentVote | Self::Cooldown | Self::AlreadyVoted => Conflict,
            Self::SessionExpired | Self::NoCurrentDj | Self::NoMembers => NotFound,
            Self::WrongBallotKind => InvalidInput,
            Self::Repository(e) => roomsync_core::IntoErrorCode::code(e),
            Self::Kv(e) => roomsync_core::IntoErrorCode::code(e),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMeta {
    room_id: RoomId,
    vote_type: VoteType,
    total_eligible_voters: u32,
    /// Mutiny only.
    threshold: Option<f64>,
    /// Mutiny only: the DJ in the seat when the session started.
    target_dj_id: Option<UserId>,
    started_at_ms: u64,
}

/// Runs DJ elections and mutinies over a shared session lifecycle (C6, §4.4).
pub struct VoteEngine {
    context: RuntimeContext,
}

impl VoteEngine {
    pub fn new(context: RuntimeContext) -> Self {
        Self { context }
    }

    fn vote_ttl(&self) -> Duration {
        Duration::from_secs(self.context.config.vote_ttl_s)
    }

    fn vote_complete_ttl(&self) -> Duration {
        Duration::from_secs(self.context.config.vote_complete_ttl_s)
    }

    /// Reads the room's active session id, self-healing (§4.4, §7) if the
    /// session itself has already expired out of the KV store without
    /// completing: the pointer is cleared and `None` is returned, freeing
    /// the room to start a new vote.
    async fn active_session_meta(&self, room_id: RoomId) -> Result<Option<(VoteSessionId, SessionMeta)>, VoteError> {
        let Some(raw_id) = self.context.kv.get(&keys::room_active_vote_session(room_id)).await? else {
            return Ok(None);
        };
        let Some(session_id) = VoteSessionId::from_str_opaque(&raw_id) else {
            return Ok(None);
        };

        match self.load_meta(session_id).await? {
            Some(meta) => Ok(Some((session_id, meta))),
            None => {
                self.context.kv.del(&keys::room_active_vote_session(room_id)).await?;
                Ok(None)
            }
        }
    }

    async fn load_meta(&self, session_id: VoteSessionId) -> Result<Option<SessionMeta>, VoteError> {
        let raw = self.context.kv.hget(&keys::vote_session(session_id), "meta").await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json).map_err(|_| VoteError::SessionExpired)?),
            None => None,
        })
    }

    async fn check_membership(&self, room_id: RoomId, user_id: UserId) -> Result<(), VoteError> {
        if self.context.is_member(room_id, user_id).await? {
            Ok(())
        } else {
            Err(VoteError::NotAMember)
        }
    }

    /// `vote:start-election` (§4.4, §6.2).
    pub async fn start_dj_election(&self, room_id: RoomId, initiator: UserId) -> Result<VoteSessionId, VoteError> {
        self.check_membership(room_id, initiator).await?;

        if self.active_session_meta(room_id).await?.is_some() {
            return Err(VoteError::ConcurrentVote);
        }

        let total_eligible_voters = self.context.repository.count_members(room_id).await?;
        let session_id = VoteSessionId::new();

        let meta = SessionMeta {
            room_id,
            vote_type: VoteType::DjElection,
            total_eligible_voters,
            threshold: None,
            target_dj_id: None,
            started_at_ms: now_ms(),
        };

        self.persist_new_session(session_id, room_id, &meta).await?;

        self.context.broadcast(
            room_id,
            RoomEvent::VoteElectionStarted {
                vote_session_id: session_id,
                total_eligible_voters,
            },
        );

        Ok(session_id)
    }

    /// `vote:start-mutiny` (§4.4, §6.2).
    pub async fn start_mutiny(&self, room_id: RoomId, initiator: UserId) -> Result<VoteSessionId, VoteError> {
        self.check_membership(room_id, initiator).await?;

        let target_dj_id = self.context.current_dj(room_id).await?.ok_or(VoteError::NoCurrentDj)?;

        let room = self.context.repository.room_by_id(room_id).await?;
        if !room.settings.mutiny_can_target_owner && self.context.is_owner(room_id, target_dj_id).await? {
            return Err(VoteError::NoCurrentDj);
        }

        if self.active_session_meta(room_id).await?.is_some() {
            return Err(VoteError::ConcurrentVote);
        }

        if let Some(deadline_raw) = self.context.kv.get(&keys::room_mutiny_cooldown(room_id)).await? {
            if let Ok(deadline_ms) = deadline_raw.parse::<u64>() {
                if deadline_ms > now_ms() {
                    return Err(VoteError::Cooldown);
                }
            }
        }

        let total_eligible_voters = self.context.repository.count_members(room_id).await?;
        let threshold = room.settings.mutiny_threshold;
        let session_id = VoteSessionId::new();

        let meta = SessionMeta {
            room_id,
            vote_type: VoteType::Mutiny,
            total_eligible_voters,
            threshold: Some(threshold),
            target_dj_id: Some(target_dj_id),
            started_at_ms: now_ms(),
        };

        self.persist_new_session(session_id, room_id, &meta).await?;

        let cooldown_deadline = now_ms() + self.context.config.mutiny_cooldown_s * 1000;
        self.context
            .kv
            .set(
                &keys::room_mutiny_cooldown(room_id),
                cooldown_deadline.to_string(),
                Some(Duration::from_secs(self.context.config.mutiny_cooldown_s)),
            )
            .await?;

        self.context.broadcast(
            room_id,
            RoomEvent::VoteMutinyStarted {
                vote_session_id: session_id,
                total_eligible_voters,
                threshold,
                target_dj_id,
            },
        );

        Ok(session_id)
    }

    /// Claims the room's active-vote-session pointer via CAS (I2/P2) so two
    /// concurrent `start_*` calls can't both believe they won: the loser's
    /// `compare_and_set` sees the pointer already occupied and is rejected,
    /// rather than the read-then-write race of checking
    /// `active_session_meta` and then unconditionally `set`-ing afterward.
    async fn persist_new_session(&self, session_id: VoteSessionId, room_id: RoomId, meta: &SessionMeta) -> Result<(), VoteError> {
        let claimed = self
            .context
            .kv
            .compare_and_set(
                &keys::room_active_vote_session(room_id),
                None,
                session_id.to_string(),
                Some(self.vote_ttl()),
            )
            .await?;

        if !claimed {
            return Err(VoteError::ConcurrentVote);
        }

        let key = keys::vote_session(session_id);
        let meta_json = serde_json::to_string(meta).expect("SessionMeta serializes");

        self.context.kv.hset(&key, "meta", meta_json).await?;
        self.context.kv.expire(&key, self.vote_ttl()).await?;

        Ok(())
    }

    /// `vote:cast-dj` (§4.4, §6.2).
    pub async fn cast_dj_vote(&self, session_id: VoteSessionId, voter_id: UserId, target_user_id: UserId) -> Result<(), VoteError> {
        let meta = self.load_meta(session_id).await?.ok_or(VoteError::SessionExpired)?;
        if meta.vote_type != VoteType::DjElection {
            return Err(VoteError::WrongBallotKind);
        }

        self.check_membership(meta.room_id, voter_id).await?;
        self.record_ballot(session_id, meta.room_id, voter_id, VoteType::DjElection, Some(target_user_id)).await?;

        let field = format!("count:{target_user_id}");
        let new_count = self.context.kv.hincr_by(&keys::vote_session(session_id), &field, 1).await?;

        let first_vote_field = format!("first_vote:{target_user_id}");
        if self.context.kv.hget(&keys::vote_session(session_id), &first_vote_field).await?.is_none() {
            self.context.kv.hset(&keys::vote_session(session_id), &first_vote_field, now_ms().to_string()).await?;
        }

        let counts = self.election_counts(session_id).await?;
        self.context.broadcast(
            meta.room_id,
            RoomEvent::VoteResultsUpdated {
                vote_session_id: session_id,
                vote_type: VoteType::DjElection,
                counts: counts.clone(),
            },
        );

        let _ = new_count;

        if let Some(winner) = self.election_decided(session_id, &meta, &counts).await? {
            self.complete_election(session_id, &meta, winner, &counts).await?;
        }

        Ok(())
    }

    /// `vote:cast-mutiny` (§4.4, §6.2).
    pub async fn cast_mutiny_vote(&self, session_id: VoteSessionId, voter_id: UserId, vote_value: bool) -> Result<(), VoteError> {
        let meta = self.load_meta(session_id).await?.ok_or(VoteError::SessionExpired)?;
        if meta.vote_type != VoteType::Mutiny {
            return Err(VoteError::WrongBallotKind);
        }

        self.check_membership(meta.room_id, voter_id).await?;
        self.record_ballot(session_id, meta.room_id, voter_id, VoteType::Mutiny, None).await?;

        let field = if vote_value { "yes" } else { "no" };
        self.context.kv.hincr_by(&keys::vote_session(session_id), field, 1).await?;

        let (yes, no) = self.mutiny_counts(session_id).await?;
        self.context.broadcast(
            meta.room_id,
            RoomEvent::VoteResultsUpdated {
                vote_session_id: session_id,
                vote_type: VoteType::Mutiny,
                counts: vec![("yes".to_string(), yes), ("no".to_string(), no)],
            },
        );

        let total = meta.total_eligible_voters;
        let threshold = meta.threshold.unwrap_or(self.context.config.mutiny_threshold);
        let need = (threshold * total as f64).ceil() as u32;
        let remaining = total.saturating_sub(yes + no);

        let decided = if yes >= need {
            Some(true)
        } else if yes + remaining < need {
            Some(false)
        } else {
            None
        };

        if let Some(passed) = decided {
            self.complete_mutiny(session_id, &meta, passed).await?;
        }

        Ok(())
    }

    /// Records the durable vote row (I3's authoritative backstop) and the
    /// in-session voter-id set (a fast duplicate check before hitting the
    /// Repository).
    async fn record_ballot(
        &self,
        session_id: VoteSessionId,
        room_id: RoomId,
        voter_id: UserId,
        vote_type: VoteType,
        target_user_id: Option<UserId>,
    ) -> Result<(), VoteError> {
        let voters_key = format!("{}:voters", keys::vote_session(session_id));

        let already = self.context.kv.smembers(&voters_key).await?.iter().any(|v| v == &voter_id.to_string());
        if already {
            return Err(VoteError::AlreadyVoted);
        }

        self.context
            .repository
            .record_vote(room_id, voter_id, session_id, vote_type, target_user_id)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict { .. } => VoteError::AlreadyVoted,
                e => VoteError::Repository(e),
            })?;

        self.context.kv.sadd(&voters_key, &voter_id.to_string()).await?;
        self.context.kv.expire(&voters_key, self.vote_ttl()).await?;

        Ok(())
    }

    async fn election_counts(&self, session_id: VoteSessionId) -> Result<Vec<(String, u32)>, VoteError> {
        let all = self.context.kv.hgetall(&keys::vote_session(session_id)).await?;
        let mut counts: Vec<(String, u32)> = all
            .into_iter()
            .filter_map(|(field, value)| {
                field.strip_prefix("count:").and_then(|candidate| {
                    value.parse::<u32>().ok().map(|n| (candidate.to_string(), n))
                })
            })
            .collect();
        counts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(counts)
    }

    async fn mutiny_counts(&self, session_id: VoteSessionId) -> Result<(u32, u32), VoteError> {
        let key = keys::vote_session(session_id);
        let yes = self.context.kv.hget(&key, "yes").await?.and_then(|v| v.parse().ok()).unwrap_or(0);
        let no = self.context.kv.hget(&key, "no").await?.and_then(|v| v.parse().ok()).unwrap_or(0);
        Ok((yes, no))
    }

    /// Evaluates election completion (§4.4): a full ballot box, or an
    /// un-catchable leader (margin over the runner-up meets or exceeds the
    /// remaining undecided voters). Ties break on first-vote timestamp,
    /// then candidate id (§9's recorded decision).
    async fn election_decided(
        &self,
        session_id: VoteSessionId,
        meta: &SessionMeta,
        counts: &[(String, u32)],
    ) -> Result<Option<UserId>, VoteError> {
        let cast: u32 = counts.iter().map(|(_, n)| n).sum();
        let remaining = meta.total_eligible_voters.saturating_sub(cast);

        let Some((_, leader_votes)) = counts.iter().max_by_key(|(_, n)| *n) else {
            return Ok(None);
        };
        let leader_votes = *leader_votes;

        let runner_up_votes = counts
            .iter()
            .filter(|(_, n)| *n != leader_votes)
            .map(|(_, n)| *n)
            .max()
            .unwrap_or(0);

        let ballot_box_full = cast >= meta.total_eligible_voters;
        let margin_uncatchable = leader_votes.saturating_sub(runner_up_votes) >= remaining && remaining > 0;

        if !(ballot_box_full || margin_uncatchable) {
            return Ok(None);
        }

        let mut tied: Vec<&(String, u32)> = counts.iter().filter(|(_, n)| *n == leader_votes).collect();
        if tied.len() == 1 {
            return Ok(UserId::from_str_opaque(&tied[0].0));
        }

        let key = keys::vote_session(session_id);
        let mut by_first_vote = Vec::with_capacity(tied.len());
        for (candidate, _) in tied.drain(..) {
            let first_vote_ms = self
                .context
                .kv
                .hget(&key, &format!("first_vote:{candidate}"))
                .await?
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(u64::MAX);
            by_first_vote.push((first_vote_ms, candidate.clone()));
        }

        by_first_vote.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(UserId::from_str_opaque(&by_first_vote[0].1))
    }

    async fn complete_election(
        &self,
        session_id: VoteSessionId,
        meta: &SessionMeta,
        winner: UserId,
        counts: &[(String, u32)],
    ) -> Result<(), VoteError> {
        let outcome_key = format!("{}:outcome", keys::vote_session(session_id));
        let outcome_json = serde_json::to_string(&winner).expect("UserId serializes");

        let won_race = self.context.kv.compare_and_set(&outcome_key, None, outcome_json, Some(self.vote_complete_ttl())).await?;
        if !won_race {
            return Ok(());
        }

        self.context.repository.apply_election_outcome(meta.room_id, winner).await?;
        self.context.kv.set(&keys::room_dj(meta.room_id), winner.to_string(), None).await?;
        self.finish_session(session_id, meta.room_id).await?;

        self.context.broadcast(
            meta.room_id,
            RoomEvent::VoteComplete {
                vote_session_id: session_id,
                vote_type: VoteType::DjElection,
                counts: counts.to_vec(),
            },
        );
        self.context.broadcast(meta.room_id, RoomEvent::DjChanged { new_dj_id: winner, reason: "vote" });

        info!("room {} elected {} as DJ", meta.room_id, winner);
        Ok(())
    }

    async fn complete_mutiny(&self, session_id: VoteSessionId, meta: &SessionMeta, passed: bool) -> Result<(), VoteError> {
        let outcome_key = format!("{}:outcome", keys::vote_session(session_id));
        let outcome_json = serde_json::to_string(&passed).expect("bool serializes");

        let won_race = self.context.kv.compare_and_set(&outcome_key, None, outcome_json, Some(self.vote_complete_ttl())).await?;
        if !won_race {
            return Ok(());
        }

        let target_dj_id = meta.target_dj_id.expect("mutiny sessions always snapshot a target DJ");
        let (yes, no) = self.mutiny_counts(session_id).await?;
        let counts = vec![("yes".to_string(), yes), ("no".to_string(), no)];

        if passed {
            self.context.repository.apply_mutiny_outcome(meta.room_id, target_dj_id).await?;
            self.context.kv.del(&keys::room_dj(meta.room_id)).await?;

            let room = self.context.repository.room_by_id(meta.room_id).await?;
            let cooldown_deadline = now_ms() + room.settings.dj_cooldown_minutes * 60 * 1000;
            self.context
                .kv
                .set(
                    &keys::room_dj_cooldown(meta.room_id, target_dj_id),
                    cooldown_deadline.to_string(),
                    Some(Duration::from_secs(room.settings.dj_cooldown_minutes * 60)),
                )
                .await?;
        }

        self.finish_session(session_id, meta.room_id).await?;

        self.context.broadcast(
            meta.room_id,
            RoomEvent::VoteComplete {
                vote_session_id: session_id,
                vote_type: VoteType::Mutiny,
                counts,
            },
        );

        if passed {
            self.context.broadcast(meta.room_id, RoomEvent::MutinySuccess { removed_dj_id: target_dj_id });
        } else {
            self.context.broadcast(meta.room_id, RoomEvent::MutinyFailed);
        }

        Ok(())
    }

    /// Clears the room's active-session pointer and shortens the session's
    /// own TTL to the post-completion window (§3's "TTL: 5 minutes;
    /// shortens to 60s on completion").
    async fn finish_session(&self, session_id: VoteSessionId, room_id: RoomId) -> Result<(), VoteError> {
        self.context.kv.del(&keys::room_active_vote_session(room_id)).await?;
        self.context.kv.expire(&keys::vote_session(session_id), self.vote_complete_ttl()).await?;
        Ok(())
    }

    /// `dj:randomize` (§4.4, §6.2). Owner-initiated, no vote: picks a
    /// random member and applies the same transition shape as an election
    /// winner, with `removal_reason = voluntary` for the previous DJ.
    pub async fn randomize_dj(&self, room_id: RoomId, owner: UserId) -> Result<UserId, VoteError> {
        if !self.context.is_owner(room_id, owner).await? {
            return Err(VoteError::NotOwner);
        }

        let members = self.context.repository.members(room_id).await?;
        let chosen = members
            .choose(&mut rand::thread_rng())
            .map(|m| m.user_id)
            .ok_or(VoteError::NoMembers)?;

        self.context.repository.apply_randomize_dj(room_id, chosen).await?;
        self.context.kv.set(&keys::room_dj(room_id), chosen.to_string(), None).await?;
        self.context.broadcast(room_id, RoomEvent::DjChanged { new_dj_id: chosen, reason: "randomize" });

        Ok(chosen)
    }

    /// Per spec §9's "Rebuild opportunities": on cold start, any room whose
    /// KV active-vote pointer is absent but whose Repository rows suggest a
    /// vote was mid-flight when the process stopped has no ephemeral state
    /// to resume — the KV copy was always the fast path, never the
    /// authority. This walks each room's durable `DjHistory`/`Vote` rows
    /// only to confirm there is nothing to rebuild into KV: an
    /// in-progress, uncompleted vote session has no durable outcome row by
    /// definition, so there is nothing for this to resurrect but a fresh
    /// `RoomEvent`-free no-op. It exists so a future durable Repository
    /// that also persists in-flight tallies has a defined seam to hook
    /// into, rather than requiring the KV schema to change.
    pub async fn rebuild_from_repository(&self, room_id: RoomId) -> Result<(), VoteError> {
        let _ = self.context.repository.current_dj_history_row(room_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_core::{Config, NewRoom, Repository as _, RoomSettings};
    use roomsync_memory::{MemoryRepository, MemoryStore};
    use std::sync::Arc;

    async fn setup_room_with_members(settings: RoomSettings, member_count: usize) -> (RuntimeContext, RoomId, Vec<UserId>) {
        let repository = Arc::new(MemoryRepository::new());
        let owner = repository.seed_user("owner").await;
        let room = repository
            .create_room(NewRoom {
                room_code: "abc".into(),
                owner_id: owner,
                settings,
            })
            .await
            .unwrap();

        let mut users = vec![owner];
        repository.add_member(room.id, owner).await.unwrap();

        for i in 1..member_count {
            let u = repository.seed_user(&format!("user{i}")).await;
            repository.add_member(room.id, u).await.unwrap();
            users.push(u);
        }

        let kv = Arc::new(MemoryStore::new());
        let context = RuntimeContext::new(kv, repository, Config::default(), Arc::new(|_, _| {}));
        (context, room.id, users)
    }

    async fn setup_room(settings: RoomSettings) -> (RuntimeContext, RoomId, Vec<UserId>) {
        setup_room_with_members(settings, 10).await
    }

    #[tokio::test]
    async fn election_tie_break_prefers_earlier_first_vote() {
        // Exactly 4 eligible voters (S5) so the election's own snapshotted
        // `total_eligible_voters` matches the scenario's margin math.
        let (context, room_id, users) = setup_room_with_members(RoomSettings::default(), 4).await;
        context.repository.members(room_id).await.unwrap();

        let voters = &users[0..4];
        let engine = VoteEngine::new(context.clone());

        let session_id = engine.start_dj_election(room_id, voters[0]).await.unwrap();

        let candidate_a = voters[0];
        let candidate_b = voters[1];

        engine.cast_dj_vote(session_id, voters[0], candidate_a).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        engine.cast_dj_vote(session_id, voters[1], candidate_b).await.unwrap();
        engine.cast_dj_vote(session_id, voters[2], candidate_a).await.unwrap();
        engine.cast_dj_vote(session_id, voters[3], candidate_b).await.unwrap();

        let dj = context.current_dj(room_id).await.unwrap();
        assert_eq!(dj, Some(candidate_a), "S5: A's earlier first vote should win the tie");
    }

    #[tokio::test]
    async fn duplicate_vote_is_rejected() {
        let (context, room_id, users) = setup_room(RoomSettings::default()).await;
        let engine = VoteEngine::new(context.clone());
        let session_id = engine.start_dj_election(room_id, users[0]).await.unwrap();

        engine.cast_dj_vote(session_id, users[0], users[0]).await.unwrap();
        let result = engine.cast_dj_vote(session_id, users[0], users[1]).await;

        assert!(matches!(result, Err(VoteError::AlreadyVoted)));
    }

    #[tokio::test]
    async fn mutiny_completes_early_on_unreachable_majority() {
        let mut settings = RoomSettings::default();
        settings.mutiny_threshold = 0.51;
        // Exactly 4 eligible voters so `need = ceil(0.51*4) = 3` matches the scenario.
        let (context, room_id, users) = setup_room_with_members(settings, 4).await;

        context.repository.apply_election_outcome(room_id, users[0]).await.unwrap();
        let engine = VoteEngine::new(context.clone());

        let voters = users.clone();
        let session_id = engine.start_mutiny(room_id, voters[1]).await.unwrap();

        engine.cast_mutiny_vote(session_id, voters[1], true).await.unwrap();
        engine.cast_mutiny_vote(session_id, voters[2], true).await.unwrap();
        engine.cast_mutiny_vote(session_id, voters[3], true).await.unwrap();

        let dj = context.current_dj(room_id).await.unwrap();
        assert_eq!(dj, None, "S6: 3/4 yes votes should pass the mutiny and clear the DJ seat");

        let cooldown = context.kv.get(&keys::room_dj_cooldown(room_id, users[0])).await.unwrap();
        assert!(cooldown.is_some(), "a passed mutiny must set the removed DJ's cooldown");
    }

    #[tokio::test]
    async fn mutiny_completes_early_on_mathematical_failure() {
        let (context, room_id, users) = setup_room(RoomSettings::default()).await;
        context.repository.apply_election_outcome(room_id, users[0]).await.unwrap();
        let engine = VoteEngine::new(context.clone());

        // 10 eligible voters (S7), need = ceil(0.51*10) = 6.
        let session_id = engine.start_mutiny(room_id, users[1]).await.unwrap();

        engine.cast_mutiny_vote(session_id, users[1], true).await.unwrap();
        for voter in &users[2..7] {
            engine.cast_mutiny_vote(session_id, *voter, false).await.unwrap();
        }

        let dj = context.current_dj(room_id).await.unwrap();
        assert_eq!(dj, Some(users[0]), "S7: yes(1)+remaining(4) < need(6) should fail early, DJ stays");
    }

    #[tokio::test]
    async fn concurrent_vote_is_rejected() {
        let (context, room_id, users) = setup_room(RoomSettings::default()).await;
        let engine = VoteEngine::new(context.clone());

        engine.start_dj_election(room_id, users[0]).await.unwrap();
        let result = engine.start_dj_election(room_id, users[1]).await;

        assert!(matches!(result, Err(VoteError::ConcurrentVote)));
    }

    #[tokio::test]
    async fn mutiny_cooldown_blocks_a_second_mutiny() {
        let (context, room_id, users) = setup_room(RoomSettings::default()).await;
        context.repository.apply_election_outcome(room_id, users[0]).await.unwrap();
        let engine = VoteEngine::new(context.clone());

        let session_id = engine.start_mutiny(room_id, users[1]).await.unwrap();
        engine.cast_mutiny_vote(session_id, users[1], false).await.unwrap();
        engine.cast_mutiny_vote(session_id, users[2], false).await.unwrap();
        // Not decided yet (remaining large); session still active, but cooldown is already set at start.

        let result = engine.start_mutiny(room_id, users[3]).await;
        assert!(matches!(result, Err(VoteError::ConcurrentVote) | Err(VoteError::Cooldown)));
    }
}
