use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{DjHistoryId, RoomId, UserId};

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Dj,
    Listener,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomMember {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: MemberRole,
}

/// Per-room policy (§3's `Room.settings`, plus the two Open Question
/// decisions recorded in SPEC_FULL.md).
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub max_members: u32,
    /// Fraction of eligible voters needed to pass a mutiny, e.g. 0.51.
    pub mutiny_threshold: f64,
    pub dj_cooldown_minutes: u64,
    pub auto_randomize_dj: bool,
    /// Open Question #1: whether a disconnecting DJ is cleared from the seat.
    pub clear_dj_on_disconnect: bool,
    /// Open Question #2: whether a mutiny may target an owner who is also the current DJ.
    pub mutiny_can_target_owner: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_members: 50,
            mutiny_threshold: 0.51,
            dj_cooldown_minutes: 15,
            auto_randomize_dj: false,
            clear_dj_on_disconnect: true,
            mutiny_can_target_owner: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub room_code: String,
    pub owner_id: UserId,
    pub settings: RoomSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Mutiny,
    Voluntary,
    Disconnect,
    Vote,
    Randomize,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mutiny => "mutiny",
            Self::Voluntary => "voluntary",
            Self::Disconnect => "disconnect",
            Self::Vote => "vote",
            Self::Randomize => "randomize",
        }
    }
}

/// A row recording a single DJ tenure in a room (§3). `removed_at.is_none()`
/// marks the currently-seated DJ; invariant I1 requires at most one such row
/// per room at any time.
#[derive(Debug, Clone)]
pub struct DjHistory {
    pub id: DjHistoryId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub became_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
    pub removal_reason: Option<RemovalReason>,
}

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub room_code: String,
    pub owner_id: UserId,
    pub settings: RoomSettings,
}
