use roomsync_core::{ErrorCode, IntoErrorCode, RepositoryError};
use roomsync_runtime::{ClockSyncError, PlaybackError, SessionError, VoteError};
use thiserror::Error;

/// Every failure the gateway can hand back to a client, collapsed to one of
/// §7's six codes before it ever reaches the wire — no component's error
/// variants or messages cross this boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("{0}")]
    Validation(String),
    #[error("event did not complete within the allotted time")]
    DeadlineExceeded,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    ClockSync(#[from] ClockSyncError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl GatewayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedFrame(_) | Self::Validation(_) => ErrorCode::InvalidInput,
            Self::DeadlineExceeded => ErrorCode::Timeout,
            Self::Session(e) => e.code(),
            Self::ClockSync(e) => e.code(),
            Self::Playback(e) => e.code(),
            Self::Vote(e) => e.code(),
            Self::Repository(e) => e.code(),
        }
    }
}
