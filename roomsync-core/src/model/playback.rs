use serde::{Deserialize, Serialize};

use crate::TrackId;

/// The playback state machine of a room (§3, §4.3, §9).
///
/// Modeled as a tagged sum rather than a record of nullable fields, per
/// spec §9's "Tagged variants" design note — the `Playing` variant cannot
/// exist without its `start_at_server_time_ms`, so there is no "missing
/// data" state for consumers to guard against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Playback {
    Stopped,
    Paused {
        position_ms: u64,
    },
    Playing {
        track_id: TrackId,
        /// Server-clock instant, in epoch milliseconds, at which this track started (or would have, accounting for `initial_position_ms`).
        start_at_server_time_ms: u64,
        initial_position_ms: u64,
        duration_ms: u64,
        sync_buffer_ms: u64,
    },
}

impl Default for Playback {
    fn default() -> Self {
        Self::Stopped
    }
}

impl Playback {
    /// Derives the current position from the tagged state and a server
    /// timestamp. Position is always derived, never advanced in place (§4.3).
    pub fn position_at(&self, now_ms: u64) -> Option<u64> {
        match self {
            Self::Stopped => None,
            Self::Paused { position_ms } => Some(*position_ms),
            Self::Playing {
                start_at_server_time_ms,
                initial_position_ms,
                ..
            } => {
                let elapsed = now_ms.saturating_sub(*start_at_server_time_ms);
                Some(initial_position_ms + elapsed)
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_has_no_position() {
        assert_eq!(Playback::Stopped.position_at(1_000), None);
    }

    #[test]
    fn paused_position_is_fixed() {
        let playback = Playback::Paused { position_ms: 4_200 };
        assert_eq!(playback.position_at(999_999), Some(4_200));
    }

    #[test]
    fn playing_position_derives_from_elapsed_time() {
        let playback = Playback::Playing {
            track_id: TrackId::new(),
            start_at_server_time_ms: 1_000,
            initial_position_ms: 0,
            duration_ms: 180_000,
            sync_buffer_ms: 100,
        };

        assert_eq!(playback.position_at(6_000), Some(5_000), "matches S8's mid-song join scenario");
    }

    #[test]
    fn playing_position_never_goes_negative_before_start() {
        let playback = Playback::Playing {
            track_id: TrackId::new(),
            start_at_server_time_ms: 5_000,
            initial_position_ms: 0,
            duration_ms: 180_000,
            sync_buffer_ms: 100,
        };

        assert_eq!(playback.position_at(4_000), Some(0), "now before start must not underflow");
    }
}
