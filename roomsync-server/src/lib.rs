use std::env;
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;

use axum::routing::get;
use axum::Router as AxumRouter;
use roomsync_core::{Broadcaster, KeyValueStore, RoomEvent};
use roomsync_runtime::{keys, ClockSyncService, PlaybackCoordinator, RuntimeContext, SessionRegistry, VoteEngine};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub mod auth;
mod context;
mod errors;
mod gateway;
mod schemas;
pub mod wire;

pub use context::ServerContext;
pub use errors::GatewayError;

/// The default port the server listens on (§6.3's ambient configuration).
pub const DEFAULT_PORT: u16 = 9100;

/// Builds the broadcast capability handed to `RuntimeContext::new`: every
/// `RoomEvent` is translated to its wire shape and published on the room's
/// KV topic, where each connected gateway's per-room forwarder picks it up.
pub fn wire_broadcaster(kv: Arc<dyn KeyValueStore>) -> Broadcaster {
    Arc::new(move |room_id, event: RoomEvent| {
        let kv = kv.clone();
        let wire = wire::WireOutbound::from(event);
        tokio::spawn(async move {
            if let Ok(json) = serde_json::to_string(&wire) {
                let _ = kv.publish(&keys::room_topic(room_id), json).await;
            }
        });
    })
}

/// Starts the room coordination gateway: a `/ws` upgrade route plus a
/// `/healthz` liveness probe, with every orchestration component wired to
/// the same `RuntimeContext`.
pub async fn run_server(runtime: RuntimeContext, auth: Arc<dyn roomsync_core::Auth>) {
    let sessions = Arc::new(SessionRegistry::new(runtime.clone(), auth));
    let clock_sync = Arc::new(ClockSyncService::new(runtime.clone()));
    let playback = Arc::new(PlaybackCoordinator::new(runtime.clone()));
    let votes = Arc::new(VoteEngine::new(runtime.clone()));

    let context = ServerContext {
        runtime,
        sessions,
        clock_sync,
        playback,
        votes,
    };

    let port = env::var("ROOMSYNC_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("ROOMSYNC_SERVER_PORT must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let router = AxumRouter::new()
        .route("/healthz", get(gateway::healthz))
        .route("/ws", get(gateway::ws_upgrade))
        .with_state(context)
        .layer(cors);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");
    log::info!("roomsync-server listening on {addr}");

    axum::serve(listener, router.into_make_service()).await.expect("server runs without fatal error");
}
