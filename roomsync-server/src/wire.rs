use roomsync_core::{Playback, RoomEvent, RoomMember};
use serde::{Deserialize, Serialize};

/// Every frame a client may send, kept distinct from the runtime's
/// `RoomEvent` so the wire encoding can change shape without touching
/// domain logic. The handshake frame is the only one accepted before a
/// connection has authenticated.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WireInbound {
    Handshake {
        token: String,
    },
    #[serde(rename = "room:join", rename_all = "camelCase")]
    RoomJoin { room_code: String },
    #[serde(rename = "room:leave", rename_all = "camelCase")]
    RoomLeave { room_code: String },
    #[serde(rename = "chat:message", rename_all = "camelCase")]
    ChatMessage { room_code: String, content: String },
    #[serde(rename = "sync:ping", rename_all = "camelCase")]
    SyncPing { client_t0: u64 },
    #[serde(rename = "sync:report", rename_all = "camelCase")]
    SyncReport { offset_ms: i64, rtt_ms: i64 },
    #[serde(rename = "playback:start", rename_all = "camelCase")]
    PlaybackStart {
        room_code: String,
        track_id: String,
        #[serde(default)]
        position: Option<u64>,
        track_duration: u64,
    },
    #[serde(rename = "playback:pause", rename_all = "camelCase")]
    PlaybackPause {
        room_code: String,
        #[serde(default)]
        position: Option<u64>,
    },
    #[serde(rename = "playback:stop", rename_all = "camelCase")]
    PlaybackStop { room_code: String },
    #[serde(rename = "vote:start-election", rename_all = "camelCase")]
    VoteStartElection { room_code: String },
    #[serde(rename = "vote:cast-dj", rename_all = "camelCase")]
    VoteCastDj {
        vote_session_id: String,
        target_user_id: String,
    },
    #[serde(rename = "vote:start-mutiny", rename_all = "camelCase")]
    VoteStartMutiny { room_code: String },
    #[serde(rename = "vote:cast-mutiny", rename_all = "camelCase")]
    VoteCastMutiny {
        vote_session_id: String,
        vote_value: VoteValue,
    },
    #[serde(rename = "dj:randomize", rename_all = "camelCase")]
    DjRandomize { room_code: String },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    Yes,
    No,
}

impl VoteValue {
    pub fn as_bool(self) -> bool {
        matches!(self, Self::Yes)
    }
}

/// Every frame the gateway sends. `RoomState` embeds `Playback` directly —
/// its own tagged-variant serialization already matches the client
/// contract (§6.2), so there is no separate mirror type to keep in sync.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WireOutbound {
    #[serde(rename = "room:state", rename_all = "camelCase")]
    RoomState {
        members: Vec<RoomMember>,
        current_dj_id: Option<String>,
        playback: Playback,
        server_timestamp_ms: u64,
    },
    #[serde(rename = "room:user-joined", rename_all = "camelCase")]
    UserJoined { user_id: String },
    #[serde(rename = "room:user-left", rename_all = "camelCase")]
    UserLeft { user_id: String },
    #[serde(rename = "chat:message", rename_all = "camelCase")]
    ChatMessage { user_id: String, content: String },
    #[serde(rename = "playback:start", rename_all = "camelCase")]
    PlaybackStart {
        track_id: String,
        position_ms: u64,
        start_at_server_time_ms: u64,
        track_duration_ms: u64,
        sync_buffer_ms: u64,
        server_timestamp_ms: u64,
    },
    #[serde(rename = "playback:pause", rename_all = "camelCase")]
    PlaybackPause {
        position_ms: u64,
        server_timestamp_ms: u64,
    },
    #[serde(rename = "playback:stop", rename_all = "camelCase")]
    PlaybackStop { server_timestamp_ms: u64 },
    #[serde(rename = "playback:sync", rename_all = "camelCase")]
    PlaybackSync {
        track_id: String,
        position_ms: u64,
        start_at_server_time_ms: u64,
        server_timestamp_ms: u64,
    },
    #[serde(rename = "track:ended", rename_all = "camelCase")]
    TrackEnded {
        track_id: String,
        server_timestamp_ms: u64,
    },
    #[serde(rename = "vote:election-started", rename_all = "camelCase")]
    VoteElectionStarted {
        vote_session_id: String,
        total_eligible_voters: u32,
    },
    #[serde(rename = "vote:mutiny-started", rename_all = "camelCase")]
    VoteMutinyStarted {
        vote_session_id: String,
        total_eligible_voters: u32,
        threshold: f64,
        target_dj_id: String,
    },
    #[serde(rename = "vote:results-updated", rename_all = "camelCase")]
    VoteResultsUpdated {
        vote_session_id: String,
        vote_type: String,
        counts: Vec<(String, u32)>,
    },
    #[serde(rename = "vote:complete", rename_all = "camelCase")]
    VoteComplete {
        vote_session_id: String,
        vote_type: String,
        counts: Vec<(String, u32)>,
    },
    #[serde(rename = "dj:changed", rename_all = "camelCase")]
    DjChanged { new_dj_id: String, reason: String },
    #[serde(rename = "dj:cleared", rename_all = "camelCase")]
    DjCleared { reason: String },
    #[serde(rename = "mutiny:success", rename_all = "camelCase")]
    MutinySuccess { removed_dj_id: String },
    #[serde(rename = "mutiny:failed")]
    MutinyFailed,
    #[serde(rename = "error", rename_all = "camelCase")]
    Error { code: String, message: String },
    #[serde(rename = "sync:pong", rename_all = "camelCase")]
    SyncPong {
        client_t0: u64,
        server_t1: u64,
        server_t2: u64,
    },
}

fn vote_type_str(vote_type: roomsync_core::VoteType) -> String {
    match vote_type {
        roomsync_core::VoteType::DjElection => "dj_election".to_string(),
        roomsync_core::VoteType::Mutiny => "mutiny".to_string(),
    }
}

impl From<RoomEvent> for WireOutbound {
    fn from(event: RoomEvent) -> Self {
        match event {
            RoomEvent::RoomState {
                members,
                current_dj_id,
                playback,
                server_timestamp_ms,
            } => Self::RoomState {
                members,
                current_dj_id: current_dj_id.map(|id| id.to_string()),
                playback,
                server_timestamp_ms,
            },
            RoomEvent::UserJoined { user_id } => Self::UserJoined {
                user_id: user_id.to_string(),
            },
            RoomEvent::UserLeft { user_id } => Self::UserLeft {
                user_id: user_id.to_string(),
            },
            RoomEvent::ChatMessage { user_id, content } => Self::ChatMessage {
                user_id: user_id.to_string(),
                content,
            },
            RoomEvent::PlaybackStart {
                track_id,
                position_ms,
                start_at_server_time_ms,
                track_duration_ms,
                sync_buffer_ms,
                server_timestamp_ms,
            } => Self::PlaybackStart {
                track_id: track_id.to_string(),
                position_ms,
                start_at_server_time_ms,
                track_duration_ms,
                sync_buffer_ms,
                server_timestamp_ms,
            },
            RoomEvent::PlaybackPause { position_ms, server_timestamp_ms } => {
                Self::PlaybackPause { position_ms, server_timestamp_ms }
            }
            RoomEvent::PlaybackStop { server_timestamp_ms } => Self::PlaybackStop { server_timestamp_ms },
            RoomEvent::PlaybackSync {
                track_id,
                position_ms,
                start_at_server_time_ms,
                server_timestamp_ms,
            } => Self::PlaybackSync {
                track_id: track_id.to_string(),
                position_ms,
                start_at_server_time_ms,
                server_timestamp_ms,
            },
            RoomEvent::TrackEnded { track_id, server_timestamp_ms } => Self::TrackEnded {
                track_id: track_id.to_string(),
                server_timestamp_ms,
            },
            RoomEvent::VoteElectionStarted { vote_session_id, total_eligible_voters } => Self::VoteElectionStarted {
                vote_session_id: vote_session_id.to_string(),
                total_eligible_voters,
            },
            RoomEvent::VoteMutinyStarted {
                vote_session_id,
                total_eligible_voters,
                threshold,
                target_dj_id,
            } => Self::VoteMutinyStarted {
                vote_session_id: vote_session_id.to_string(),
                total_eligible_voters,
                threshold,
                target_dj_id: target_dj_id.to_string(),
            },
            RoomEvent::VoteResultsUpdated { vote_session_id, vote_type, counts } => Self::VoteResultsUpdated {
                vote_session_id: vote_session_id.to_string(),
                vote_type: vote_type_str(vote_type),
                counts,
            },
            RoomEvent::VoteComplete { vote_session_id, vote_type, counts } => Self::VoteComplete {
                vote_session_id: vote_session_id.to_string(),
                vote_type: vote_type_str(vote_type),
                counts,
            },
            RoomEvent::DjChanged { new_dj_id, reason } => Self::DjChanged {
                new_dj_id: new_dj_id.to_string(),
                reason: reason.to_string(),
            },
            RoomEvent::DjCleared { reason } => Self::DjCleared { reason: reason.to_string() },
            RoomEvent::MutinySuccess { removed_dj_id } => Self::MutinySuccess {
                removed_dj_id: removed_dj_id.to_string(),
            },
            RoomEvent::MutinyFailed => Self::MutinyFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_room_join_parses_from_the_wire_field_names() {
        let json = r#"{"type":"room:join","roomCode":"abc123"}"#;
        let parsed: WireInbound = serde_json::from_str(json).expect("valid frame");
        assert!(matches!(parsed, WireInbound::RoomJoin { room_code } if room_code == "abc123"));
    }

    #[test]
    fn outbound_mutiny_failed_serializes_with_no_payload_fields() {
        let wire = WireOutbound::from(RoomEvent::MutinyFailed);
        let json = serde_json::to_string(&wire).unwrap();
        assert_eq!(json, r#"{"type":"mutiny:failed"}"#);
    }
}
