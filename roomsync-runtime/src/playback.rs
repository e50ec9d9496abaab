use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{error, warn};
use roomsync_core::{Playback, RepositoryError, RoomEvent, RoomId, RoomMember, TrackId, UserId};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::clock_sync::ClockSyncService;
use crate::context::{now_ms, RuntimeContext};
use crate::keys;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("only the current DJ may control playback")]
    NotCurrentDj,
    #[error("room is not currently playing")]
    NotPlaying,
    #[error("room is not playing or paused")]
    NotPlayingOrPaused,
    #[error("playback state changed concurrently, retry")]
    Conflict,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Kv(#[from] roomsync_core::KvError),
}

impl roomsync_core::IntoErrorCode for PlaybackError {
    fn code(&self) -> roomsync_core::ErrorCode {
        use roomsync_core::ErrorCode::*;
        match self {
            Self::NotCurrentDj => Unauthorized,
            Self::NotPlaying | Self::NotPlayingOrPaused => Conflict,
            Self::Conflict => Conflict,
            Self::Repository(e) => roomsync_core::IntoErrorCode::code(e),
            Self::Kv(e) => roomsync_core::IntoErrorCode::code(e),
        }
    }
}

/// One-shot snapshot sent to a member joining mid-session (§4.3).
pub struct RoomStateSnapshot {
    pub members: Vec<RoomMember>,
    pub current_dj_id: Option<UserId>,
    pub playback: Playback,
    pub server_timestamp_ms: u64,
}

/// The per-room playback state machine (C5, §4.3). Sync tickers are owned
/// here, keyed by `RoomId`, per spec §9's "module-level state" design
/// note — starting a new ticker for a room cancels any prior one.
pub struct PlaybackCoordinator {
    context: RuntimeContext,
    clock_sync: ClockSyncService,
    tickers: DashMap<RoomId, JoinHandle<()>>,
}

impl PlaybackCoordinator {
    pub fn new(context: RuntimeContext) -> Self {
        Self {
            clock_sync: ClockSyncService::new(context.clone()),
            context,
            tickers: DashMap::new(),
        }
    }

    async fn read_playback(&self, room_id: RoomId) -> (Option<String>, Playback) {
        let raw = match self.context.kv.get(&keys::room_playback(room_id)).await {
            Ok(raw) => raw,
            Err(err) => {
                error!("failed to read playback state for room {room_id}: {err}");
                return (None, Playback::Stopped);
            }
        };

        let playback = match &raw {
            None => Playback::Stopped,
            Some(json) => serde_json::from_str(json).unwrap_or_else(|err| {
                warn!("malformed playback state for room {room_id}, treating as stopped: {err}");
                Playback::Stopped
            }),
        };

        (raw, playback)
    }

    async fn write_playback(&self, room_id: RoomId, previous_raw: Option<&str>, new_state: &Playback) -> Result<(), PlaybackError> {
        let new_json = serde_json::to_string(new_state).expect("Playback serializes");
        let applied = self
            .context
            .kv
            .compare_and_set(&keys::room_playback(room_id), previous_raw, new_json, None)
            .await?;

        if applied {
            Ok(())
        } else {
            Err(PlaybackError::Conflict)
        }
    }

    async fn require_current_dj(&self, room_id: RoomId, user_id: UserId) -> Result<(), PlaybackError> {
        if self.context.is_current_dj(room_id, user_id).await? {
            Ok(())
        } else {
            Err(PlaybackError::NotCurrentDj)
        }
    }

    /// `playback:start` (§4.3 table). Allowed from any state.
    pub async fn start(
        &self,
        room_id: RoomId,
        caller: UserId,
        track_id: TrackId,
        start_position_ms: u64,
        track_duration_ms: u64,
    ) -> Result<(), PlaybackError> {
        self.require_current_dj(room_id, caller).await?;

        let (previous_raw, _) = self.read_playback(room_id).await;

        let max_rtt = self.clock_sync.max_room_rtt(room_id).await.map_err(|_| PlaybackError::Conflict)?;
        let sync_buffer_ms = self.context.config.sync_buffer_ms(max_rtt);
        let now = now_ms();
        let start_at_server_time_ms = now + sync_buffer_ms;

        let new_state = Playback::Playing {
            track_id,
            start_at_server_time_ms,
            initial_position_ms: start_position_ms,
            duration_ms: track_duration_ms,
            sync_buffer_ms,
        };

        self.write_playback(room_id, previous_raw.as_deref(), &new_state).await?;

        self.context.broadcast(
            room_id,
            RoomEvent::PlaybackStart {
                track_id,
                position_ms: start_position_ms,
                start_at_server_time_ms,
                track_duration_ms,
                sync_buffer_ms,
                server_timestamp_ms: now,
            },
        );

        self.start_ticker(room_id);
        Ok(())
    }

    /// `playback:pause` (§4.3 table). Only allowed while playing.
    pub async fn pause(&self, room_id: RoomId, caller: UserId, position_ms: u64) -> Result<(), PlaybackError> {
        self.require_current_dj(room_id, caller).await?;

        let (previous_raw, current) = self.read_playback(room_id).await;
        if !current.is_playing() {
            return Err(PlaybackError::NotPlaying);
        }

        let new_state = Playback::Paused { position_ms };
        self.write_playback(room_id, previous_raw.as_deref(), &new_state).await?;

        self.context.broadcast(
            room_id,
            RoomEvent::PlaybackPause {
                position_ms,
                server_timestamp_ms: now_ms(),
            },
        );

        self.stop_ticker(room_id);
        Ok(())
    }

    /// `playback:stop` (§4.3 table). Allowed while playing or paused.
    pub async fn stop(&self, room_id: RoomId, caller: UserId) -> Result<(), PlaybackError> {
        self.require_current_dj(room_id, caller).await?;

        let (previous_raw, current) = self.read_playback(room_id).await;
        if matches!(current, Playback::Stopped) {
            return Err(PlaybackError::NotPlayingOrPaused);
        }

        self.write_playback(room_id, previous_raw.as_deref(), &Playback::Stopped).await?;

        self.context.broadcast(
            room_id,
            RoomEvent::PlaybackStop {
                server_timestamp_ms: now_ms(),
            },
        );

        self.stop_ticker(room_id);
        Ok(())
    }

    /// Composes the one-shot snapshot sent to a member joining mid-session (§4.3).
    pub async fn snapshot(&self, room_id: RoomId) -> Result<RoomStateSnapshot, PlaybackError> {
        let members = self.context.repository.members(room_id).await?;
        let current_dj_id = self.context.current_dj(room_id).await?;
        let (_, playback) = self.read_playback(room_id).await;

        Ok(RoomStateSnapshot {
            members,
            current_dj_id,
            playback,
            server_timestamp_ms: now_ms(),
        })
    }

    fn start_ticker(&self, room_id: RoomId) {
        self.stop_ticker(room_id);

        let context = self.context.clone();
        let period = Duration::from_millis(self.context.config.sync_tick_ms);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick fires immediately; skip it

            loop {
                interval.tick().await;

                match run_sync_tick(&context, room_id).await {
                    Ok(should_continue) => {
                        if !should_continue {
                            // Room left the `playing` state (paused/stopped
                            // elsewhere, or this tick ended the track);
                            // this ticker's job is done. The coordinator's
                            // ticker map still holds this finished handle
                            // until the next `start` replaces it.
                            break;
                        }
                    }
                    Err(err) => {
                        // Transient KV errors are logged and the ticker
                        // continues; the next tick retries (§4.3's
                        // "Failure semantics").
                        warn!("sync tick failed for room {room_id}, will retry next tick: {err}");
                    }
                }
            }
        });

        self.tickers.insert(room_id, handle);
    }

    fn stop_ticker(&self, room_id: RoomId) {
        if let Some((_, handle)) = self.tickers.remove(&room_id) {
            handle.abort();
        }
    }
}

/// Runs one tick of the periodic sync broadcast (§4.3). Returns whether the
/// ticker should keep running: `false` once the room has left the
/// `playing` state, either because this tick just ended the track or
/// because something else (a pause/stop) already transitioned it away.
async fn run_sync_tick(context: &RuntimeContext, room_id: RoomId) -> Result<bool, roomsync_core::KvError> {
    let raw = context.kv.get(&keys::room_playback(room_id)).await?;
    let playback: Option<Playback> = raw.as_deref().and_then(|json| serde_json::from_str(json).ok());

    let Some(Playback::Playing {
        track_id,
        start_at_server_time_ms,
        initial_position_ms,
        duration_ms,
        ..
    }) = playback
    else {
        return Ok(false);
    };

    let now = now_ms();
    let elapsed = now.saturating_sub(start_at_server_time_ms);
    let position_ms = initial_position_ms + elapsed;

    if position_ms >= duration_ms {
        context.broadcast(
            room_id,
            RoomEvent::TrackEnded {
                track_id,
                server_timestamp_ms: now,
            },
        );

        let new_json = serde_json::to_string(&Playback::Stopped).expect("Playback serializes");
        context.kv.set(&keys::room_playback(room_id), new_json, None).await?;

        Ok(false)
    } else {
        context.broadcast(
            room_id,
            RoomEvent::PlaybackSync {
                track_id,
                position_ms,
                start_at_server_time_ms,
                server_timestamp_ms: now,
            },
        );

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_core::{Config, NewRoom, Repository as _};
    use roomsync_memory::{MemoryRepository, MemoryStore};

    async fn setup() -> (RuntimeContext, RoomId, UserId) {
        let repository = Arc::new(MemoryRepository::new());
        let dj = repository.seed_user("dj").await;
        let room = repository
            .create_room(NewRoom {
                room_code: "room1".into(),
                owner_id: dj,
                settings: Default::default(),
            })
            .await
            .unwrap();
        repository.add_member(room.id, dj).await.unwrap();
        repository.apply_election_outcome(room.id, dj).await.unwrap();

        let kv = Arc::new(MemoryStore::new());
        let context = RuntimeContext::new(kv, repository, Config::default(), Arc::new(|_, _| {}));
        (context, room.id, dj)
    }

    #[tokio::test]
    async fn start_requires_current_dj() {
        let (context, room_id, _dj) = setup().await;
        let coordinator = PlaybackCoordinator::new(context);
        let impostor = UserId::new();

        let result = coordinator.start(room_id, impostor, TrackId::new(), 0, 180_000).await;
        assert!(matches!(result, Err(PlaybackError::NotCurrentDj)));
    }

    #[tokio::test]
    async fn start_publishes_a_buffer_within_the_configured_bounds() {
        let (context, room_id, dj) = setup().await;
        context.kv.sadd(&keys::room_connections(room_id), "conn-1").await.unwrap();
        context.kv.hset("conn:conn-1", "last_rtt_ms", "150".into()).await.unwrap();

        let coordinator = PlaybackCoordinator::new(context.clone());
        coordinator.start(room_id, dj, TrackId::new(), 0, 180_000).await.unwrap();

        let (_, playback) = coordinator.read_playback(room_id).await;
        match playback {
            Playback::Playing { sync_buffer_ms, start_at_server_time_ms, .. } => {
                assert_eq!(sync_buffer_ms, 300, "S1: rtt=150ms*2=300 is within [100,500]");
                assert!(start_at_server_time_ms >= now_ms(), "start must be in the future");
            }
            other => panic!("expected Playing, got {other:?}"),
        }

        coordinator.stop_ticker(room_id);
    }

    #[tokio::test]
    async fn pause_requires_playing_state() {
        let (context, room_id, dj) = setup().await;
        let coordinator = PlaybackCoordinator::new(context);

        let result = coordinator.pause(room_id, dj, 0).await;
        assert!(matches!(result, Err(PlaybackError::NotPlaying)));
    }

    #[tokio::test]
    async fn mid_song_join_snapshot_reports_derived_position() {
        let (context, room_id, dj) = setup().await;
        let playback = Playback::Playing {
            track_id: TrackId::new(),
            start_at_server_time_ms: now_ms().saturating_sub(5_000),
            initial_position_ms: 0,
            duration_ms: 180_000,
            sync_buffer_ms: 100,
        };
        context
            .kv
            .set(&keys::room_playback(room_id), serde_json::to_string(&playback).unwrap(), None)
            .await
            .unwrap();

        let coordinator = PlaybackCoordinator::new(context);
        let snapshot = coordinator.snapshot(room_id).await.unwrap();

        assert_eq!(snapshot.current_dj_id, Some(dj));
        match snapshot.playback {
            Playback::Playing { initial_position_ms, start_at_server_time_ms, .. } => {
                let derived = initial_position_ms + (snapshot.server_timestamp_ms - start_at_server_time_ms);
                assert!((4_900..=5_200).contains(&derived), "S8: position should read roughly 5000ms in, got {derived}");
            }
            other => panic!("expected Playing, got {other:?}"),
        }
    }
}
