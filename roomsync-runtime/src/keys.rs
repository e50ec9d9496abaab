//! Central place for the KV store's key layout, so every component agrees
//! on where a given piece of ephemeral state lives without restating the
//! naming scheme.

use roomsync_core::{RoomId, UserId, VoteSessionId};

pub fn connection(id: impl std::fmt::Display) -> String {
    format!("conn:{id}")
}

pub fn connection_rooms(id: impl std::fmt::Display) -> String {
    format!("conn:{id}:rooms")
}

pub fn room_connections(room_id: RoomId) -> String {
    format!("room:{room_id}:connections")
}

pub fn room_dj(room_id: RoomId) -> String {
    format!("room:{room_id}:dj")
}

pub fn room_playback(room_id: RoomId) -> String {
    format!("room:{room_id}:playback")
}

pub fn room_active_vote_session(room_id: RoomId) -> String {
    format!("room:{room_id}:active_vote")
}

pub fn room_mutiny_cooldown(room_id: RoomId) -> String {
    format!("room:{room_id}:mutiny_cooldown")
}

pub fn room_dj_cooldown(room_id: RoomId, user_id: UserId) -> String {
    format!("room:{room_id}:dj_cooldown:{user_id}")
}

pub fn vote_session(id: VoteSessionId) -> String {
    format!("vote_session:{id}")
}

pub fn room_topic(room_id: RoomId) -> String {
    format!("room:{room_id}")
}
