use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RoomId, UserId, VoteSessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    DjElection,
    Mutiny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VoteOutcome {
    ElectionWinner(UserId),
    MutinyPassed(bool),
}

/// Either flavor of vote session (§3). Kept as one type with a kind-specific
/// payload, mirroring the tagged-variant discipline used for `Playback`:
/// a `DjElection` session cannot be read as if it had `yes_count`/`no_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSession {
    pub id: VoteSessionId,
    pub room_id: RoomId,
    pub total_eligible_voters: u32,
    pub voter_ids: HashSet<UserId>,
    pub is_complete: bool,
    pub outcome: Option<VoteOutcome>,
    pub started_at: DateTime<Utc>,
    pub kind: VoteSessionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VoteSessionKind {
    Election {
        vote_count_by_candidate: HashMap<UserId, u32>,
        first_vote_timestamp_by_candidate: HashMap<UserId, DateTime<Utc>>,
    },
    Mutiny {
        yes_count: u32,
        no_count: u32,
        threshold: f64,
        target_dj_id: UserId,
    },
}

impl VoteSession {
    pub fn new_election(id: VoteSessionId, room_id: RoomId, total_eligible_voters: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            room_id,
            total_eligible_voters,
            voter_ids: HashSet::new(),
            is_complete: false,
            outcome: None,
            started_at,
            kind: VoteSessionKind::Election {
                vote_count_by_candidate: HashMap::new(),
                first_vote_timestamp_by_candidate: HashMap::new(),
            },
        }
    }

    pub fn new_mutiny(
        id: VoteSessionId,
        room_id: RoomId,
        total_eligible_voters: u32,
        threshold: f64,
        target_dj_id: UserId,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            room_id,
            total_eligible_voters,
            voter_ids: HashSet::new(),
            is_complete: false,
            outcome: None,
            started_at,
            kind: VoteSessionKind::Mutiny {
                yes_count: 0,
                no_count: 0,
                threshold,
                target_dj_id,
            },
        }
    }

    pub fn vote_type(&self) -> VoteType {
        match self.kind {
            VoteSessionKind::Election { .. } => VoteType::DjElection,
            VoteSessionKind::Mutiny { .. } => VoteType::Mutiny,
        }
    }
}

/// A cast vote's durable shape (§3). Uniqueness of `(room_id, voter_id, vote_session_id)`
/// is enforced by the Repository (I3), not by this type.
#[derive(Debug, Clone)]
pub struct Vote {
    pub room_id: RoomId,
    pub voter_id: UserId,
    pub vote_type: VoteType,
    pub target_user_id: Option<UserId>,
    pub vote_session_id: VoteSessionId,
}
