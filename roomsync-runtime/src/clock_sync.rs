use roomsync_core::{ConnectionId, RoomId};
use thiserror::Error;

use crate::{context::now_ms, context::RuntimeContext, keys};

const ONE_HOUR_MS: i64 = 60 * 60 * 1000;
const DEFAULT_ROOM_RTT_FLOOR_MS: u64 = 50;

#[derive(Debug, Error)]
pub enum ClockSyncError {
    #[error("clientT0 is too far from server time to be a reasonable ping (observed serverT1={server_t1})")]
    ClockTooFarOff { server_t1: u64 },
    #[error("offsetMs or rttMs is out of the accepted range")]
    OutOfRange,
    #[error(transparent)]
    Kv(#[from] roomsync_core::KvError),
}

impl roomsync_core::IntoErrorCode for ClockSyncError {
    fn code(&self) -> roomsync_core::ErrorCode {
        use roomsync_core::ErrorCode::*;
        match self {
            Self::ClockTooFarOff { .. } | Self::OutOfRange => InvalidInput,
            Self::Kv(e) => roomsync_core::IntoErrorCode::code(e),
        }
    }
}

pub struct PingReply {
    pub client_t0: u64,
    pub server_t1: u64,
    pub server_t2: u64,
}

/// A lightweight NTP-style clock exchange (§4.2, C4).
pub struct ClockSyncService {
    context: RuntimeContext,
}

impl ClockSyncService {
    pub fn new(context: RuntimeContext) -> Self {
        Self { context }
    }

    /// Handles `sync:ping`. The server stamps `serverT1` on receive and
    /// `serverT2` just before replying, handing the client everything it
    /// needs to compute offset and RTT itself (smoothing is a client
    /// responsibility per §4.2).
    pub fn ping(&self, client_t0: u64) -> Result<PingReply, ClockSyncError> {
        let server_t1 = now_ms();

        if (server_t1 as i64 - client_t0 as i64).abs() > ONE_HOUR_MS {
            return Err(ClockSyncError::ClockTooFarOff { server_t1 });
        }

        let server_t2 = now_ms();

        Ok(PingReply {
            client_t0,
            server_t1,
            server_t2,
        })
    }

    /// Handles `sync:report`, storing the client's self-measured offset
    /// and RTT on the connection record with the connection's TTL.
    pub async fn report(
        &self,
        connection_id: ConnectionId,
        offset_ms: i64,
        rtt_ms: i64,
    ) -> Result<(), ClockSyncError> {
        if offset_ms.abs() > 3_600_000 || !(0..=10_000).contains(&rtt_ms) {
            return Err(ClockSyncError::OutOfRange);
        }

        let key = keys::connection(connection_id);
        self.context.kv.hset(&key, "clock_offset_ms", offset_ms.to_string()).await?;
        self.context.kv.hset(&key, "last_rtt_ms", rtt_ms.to_string()).await?;
        self.context.kv.expire(&key, std::time::Duration::from_secs(self.context.config.connection_ttl_s)).await?;

        Ok(())
    }

    /// Aggregates the maximum observed RTT across a *specific room's*
    /// connections (§4.2, P6) — the lookup is scoped to
    /// `room:{id}:connections` and never performs a global scan.
    pub async fn max_room_rtt(&self, room_id: RoomId) -> Result<u64, ClockSyncError> {
        let connection_ids = self.context.kv.smembers(&keys::room_connections(room_id)).await?;

        if connection_ids.is_empty() {
            return Ok(DEFAULT_ROOM_RTT_FLOOR_MS);
        }

        // Hash fields aren't addressable through `mget` directly in this
        // backend, so batch via individual hash reads instead; `mget`
        // remains the primitive this aggregation would use against a
        // multi-instance KV backend that mirrors RTTs into plain keys.
        let mut max_rtt = 0u64;
        let mut any = false;

        for id in &connection_ids {
            if let Some(raw) = self.context.kv.hget(&keys::connection(id), "last_rtt_ms").await? {
                if let Ok(value) = raw.parse::<u64>() {
                    any = true;
                    max_rtt = max_rtt.max(value);
                }
            }
        }

        Ok(if any { max_rtt } else { DEFAULT_ROOM_RTT_FLOOR_MS })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_core::Config;
    use roomsync_memory::{MemoryRepository, MemoryStore};
    use std::sync::Arc;

    fn context() -> RuntimeContext {
        RuntimeContext::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryRepository::new()),
            Config::default(),
            Arc::new(|_, _| {}),
        )
    }

    #[test]
    fn ping_rejects_clocks_over_an_hour_off() {
        let service = ClockSyncService::new(context());
        let far_off = now_ms().saturating_sub(2 * ONE_HOUR_MS as u64);
        let result = service.ping(far_off);
        assert!(matches!(result, Err(ClockSyncError::ClockTooFarOff { .. })));
    }

    #[test]
    fn ping_echoes_client_t0() {
        let service = ClockSyncService::new(context());
        let reply = service.ping(now_ms()).expect("clock within an hour is accepted");
        assert!(reply.server_t2 >= reply.server_t1);
    }

    #[tokio::test]
    async fn report_rejects_out_of_range_rtt() {
        let service = ClockSyncService::new(context());
        let result = service.report(ConnectionId::new(), 0, 20_000).await;
        assert!(matches!(result, Err(ClockSyncError::OutOfRange)));
    }

    #[tokio::test]
    async fn max_room_rtt_floors_to_default_when_empty() {
        let service = ClockSyncService::new(context());
        let rtt = service.max_room_rtt(RoomId::new()).await.unwrap();
        assert_eq!(rtt, DEFAULT_ROOM_RTT_FLOOR_MS);
    }

    #[tokio::test]
    async fn max_room_rtt_only_considers_connections_in_that_room() {
        let ctx = context();
        let service = ClockSyncService::new(ctx.clone());

        let room_a = RoomId::new();
        let room_b = RoomId::new();
        let conn_in_a = ConnectionId::new();
        let conn_in_b = ConnectionId::new();

        ctx.kv.sadd(&keys::room_connections(room_a), &conn_in_a.to_string()).await.unwrap();
        ctx.kv.sadd(&keys::room_connections(room_b), &conn_in_b.to_string()).await.unwrap();

        service.report(conn_in_a, 0, 150).await.unwrap();
        service.report(conn_in_b, 0, 900).await.unwrap();

        assert_eq!(service.max_room_rtt(room_a).await.unwrap(), 150, "room a's rtt must not see room b's connection");
    }
}
