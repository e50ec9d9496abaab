use std::sync::Arc;

use serde::Serialize;

use crate::{Playback, RoomId, RoomMember, TrackId, UserId, VoteSessionId, VoteType};

/// Domain-level broadcast events (§6.2's outbound table), kept distinct
/// from the wire encoding the gateway actually sends over the socket
/// (spec §9: "separate the domain type from the wire type"). The gateway
/// owns translating these into `WireOutbound` frames.
#[derive(Debug, Clone, Serialize)]
pub enum RoomEvent {
    RoomState {
        members: Vec<RoomMember>,
        current_dj_id: Option<UserId>,
        playback: Playback,
        server_timestamp_ms: u64,
    },
    UserJoined {
        user_id: UserId,
    },
    UserLeft {
        user_id: UserId,
    },
    ChatMessage {
        user_id: UserId,
        content: String,
    },
    PlaybackStart {
        track_id: TrackId,
        position_ms: u64,
        start_at_server_time_ms: u64,
        track_duration_ms: u64,
        sync_buffer_ms: u64,
        server_timestamp_ms: u64,
    },
    PlaybackPause {
        position_ms: u64,
        server_timestamp_ms: u64,
    },
    PlaybackStop {
        server_timestamp_ms: u64,
    },
    PlaybackSync {
        track_id: TrackId,
        position_ms: u64,
        start_at_server_time_ms: u64,
        server_timestamp_ms: u64,
    },
    TrackEnded {
        track_id: TrackId,
        server_timestamp_ms: u64,
    },
    VoteElectionStarted {
        vote_session_id: VoteSessionId,
        total_eligible_voters: u32,
    },
    VoteMutinyStarted {
        vote_session_id: VoteSessionId,
        total_eligible_voters: u32,
        threshold: f64,
        target_dj_id: UserId,
    },
    VoteResultsUpdated {
        vote_session_id: VoteSessionId,
        vote_type: VoteType,
        counts: Vec<(String, u32)>,
    },
    VoteComplete {
        vote_session_id: VoteSessionId,
        vote_type: VoteType,
        counts: Vec<(String, u32)>,
    },
    DjChanged {
        new_dj_id: UserId,
        reason: &'static str,
    },
    DjCleared {
        reason: &'static str,
    },
    MutinySuccess {
        removed_dj_id: UserId,
    },
    MutinyFailed,
}

/// A capability handed to the Playback Coordinator and Vote Engine at
/// construction so they can broadcast without holding a reference back to
/// the Gateway — breaking the cyclic dependency spec §9 calls out.
pub type Broadcaster = Arc<dyn Fn(RoomId, RoomEvent) + Send + Sync>;
