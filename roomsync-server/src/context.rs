use std::sync::Arc;

use axum::extract::FromRef;
use roomsync_runtime::{ClockSyncService, PlaybackCoordinator, RuntimeContext, SessionRegistry, VoteEngine};

/// Axum application state: one instance of each orchestration component,
/// all sharing the same `RuntimeContext` underneath (mirroring the
/// teacher's `ServerContext` wrapping a single `Collab`).
#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub runtime: RuntimeContext,
    pub sessions: Arc<SessionRegistry>,
    pub clock_sync: Arc<ClockSyncService>,
    pub playback: Arc<PlaybackCoordinator>,
    pub votes: Arc<VoteEngine>,
}
