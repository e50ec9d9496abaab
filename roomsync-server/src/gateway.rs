use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use roomsync_core::{ConnectionId, Id, RoomId};
use roomsync_runtime::keys;
use tokio::sync::mpsc;

use crate::context::ServerContext;
use crate::errors::GatewayError;
use crate::schemas::{self, ChatMessageSchema, PlaybackStartSchema, RoomCodeSchema};
use crate::wire::{VoteValue, WireInbound, WireOutbound};

/// Every inbound frame gets this long to run end to end before the
/// connection is told it timed out (§5's implicit per-event deadline).
const EVENT_DEADLINE: Duration = Duration::from_secs(5);

pub async fn healthz() -> impl IntoResponse {
    "ok"
}

pub async fn ws_upgrade(State(ctx): State<ServerContext>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: ServerContext) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let connection_id = match authenticate(&mut stream, &ctx).await {
        Ok(id) => id,
        Err(err) => {
            let _ = outbound_tx.send(error_message(&err));
            writer.abort();
            return;
        }
    };

    let mut forwarders: HashMap<RoomId, tokio::task::JoinHandle<()>> = HashMap::new();

    while let Some(frame) = stream.next().await {
        let Ok(msg) = frame else { break };
        let Message::Text(text) = msg else { continue };

        let result = tokio::time::timeout(
            EVENT_DEADLINE,
            dispatch(&ctx, connection_id, &text, &outbound_tx, &mut forwarders),
        )
        .await
        .unwrap_or(Err(GatewayError::DeadlineExceeded));

        if let Err(err) = result {
            warn!("connection {connection_id} event failed: {err}");
            let _ = outbound_tx.send(error_message(&err));
        }
    }

    for (_, handle) in forwarders.drain() {
        handle.abort();
    }

    if let Ok(rooms) = ctx.sessions.disconnect(connection_id).await {
        info!("connection {connection_id} disconnected from {} room(s)", rooms.len());
    }

    writer.abort();
}

async fn authenticate(
    stream: &mut SplitStream<WebSocket>,
    ctx: &ServerContext,
) -> Result<ConnectionId, GatewayError> {
    let frame = tokio::time::timeout(EVENT_DEADLINE, stream.next())
        .await
        .map_err(|_| GatewayError::DeadlineExceeded)?
        .ok_or_else(|| GatewayError::MalformedFrame("connection closed before handshake".into()))?
        .map_err(|e| GatewayError::MalformedFrame(e.to_string()))?;

    let Message::Text(text) = frame else {
        return Err(GatewayError::MalformedFrame("handshake must be a text frame".into()));
    };

    let inbound: WireInbound =
        serde_json::from_str(&text).map_err(|e| GatewayError::MalformedFrame(e.to_string()))?;

    let WireInbound::Handshake { token } = inbound else {
        return Err(GatewayError::MalformedFrame("first frame must be a handshake".into()));
    };

    Ok(ctx.sessions.handshake(&token).await?)
}

async fn dispatch(
    ctx: &ServerContext,
    connection_id: ConnectionId,
    text: &str,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    forwarders: &mut HashMap<RoomId, tokio::task::JoinHandle<()>>,
) -> Result<(), GatewayError> {
    ctx.sessions.touch(connection_id).await?;
    let caller = ctx.sessions.user_of(connection_id).await?;

    let inbound: WireInbound = serde_json::from_str(text).map_err(|e| GatewayError::MalformedFrame(e.to_string()))?;

    match inbound {
        WireInbound::Handshake { .. } => {
            return Err(GatewayError::Validation("already authenticated".into()));
        }

        WireInbound::RoomJoin { room_code } => {
            let room_id = resolve_room(ctx, &room_code).await?;
            ctx.sessions.join_room(connection_id, room_id).await?;
            ensure_forwarder(ctx, room_id, outbound_tx, forwarders);

            let snapshot = ctx.playback.snapshot(room_id).await?;
            let wire = WireOutbound::RoomState {
                members: snapshot.members,
                current_dj_id: snapshot.current_dj_id.map(|id| id.to_string()),
                playback: snapshot.playback,
                server_timestamp_ms: snapshot.server_timestamp_ms,
            };
            send_one(outbound_tx, &wire);
        }

        WireInbound::RoomLeave { room_code } => {
            let room_id = resolve_room(ctx, &room_code).await?;
            ctx.sessions.leave_room(connection_id, room_id).await?;
            if let Some(handle) = forwarders.remove(&room_id) {
                handle.abort();
            }
        }

        WireInbound::ChatMessage { room_code, content } => {
            schemas::validate(&ChatMessageSchema { content: &content })?;
            let room_id = resolve_room(ctx, &room_code).await?;
            if !ctx.runtime.is_member(room_id, caller).await? {
                return Err(GatewayError::Session(roomsync_runtime::SessionError::NotAMember));
            }
            let content = strip_html(&content);
            ctx.runtime.broadcast(room_id, roomsync_core::RoomEvent::ChatMessage { user_id: caller, content });
        }

        WireInbound::SyncPing { client_t0 } => {
            let reply = ctx.clock_sync.ping(client_t0)?;
            let wire = WireOutbound::SyncPong {
                client_t0: reply.client_t0,
                server_t1: reply.server_t1,
                server_t2: reply.server_t2,
            };
            send_one(outbound_tx, &wire);
        }

        WireInbound::SyncReport { offset_ms, rtt_ms } => {
            ctx.clock_sync.report(connection_id, offset_ms, rtt_ms).await?;
        }

        WireInbound::PlaybackStart { room_code, track_id, position, track_duration } => {
            schemas::validate(&PlaybackStartSchema { track_duration })?;
            let room_id = resolve_room(ctx, &room_code).await?;
            let track_id = parse_id(&track_id)?;
            ctx.playback.start(room_id, caller, track_id, position.unwrap_or(0), track_duration).await?;
        }

        WireInbound::PlaybackPause { room_code, position } => {
            let room_id = resolve_room(ctx, &room_code).await?;
            ctx.playback.pause(room_id, caller, position.unwrap_or(0)).await?;
        }

        WireInbound::PlaybackStop { room_code } => {
            let room_id = resolve_room(ctx, &room_code).await?;
            ctx.playback.stop(room_id, caller).await?;
        }

        WireInbound::VoteStartElection { room_code } => {
            let room_id = resolve_room(ctx, &room_code).await?;
            ctx.votes.start_dj_election(room_id, caller).await?;
        }

        WireInbound::VoteCastDj { vote_session_id, target_user_id } => {
            let session_id = parse_id(&vote_session_id)?;
            let target = parse_id(&target_user_id)?;
            ctx.votes.cast_dj_vote(session_id, caller, target).await?;
        }

        WireInbound::VoteStartMutiny { room_code } => {
            let room_id = resolve_room(ctx, &room_code).await?;
            ctx.votes.start_mutiny(room_id, caller).await?;
        }

        WireInbound::VoteCastMutiny { vote_session_id, vote_value } => {
            let session_id = parse_id(&vote_session_id)?;
            ctx.votes.cast_mutiny_vote(session_id, caller, vote_value.as_bool()).await?;
        }

        WireInbound::DjRandomize { room_code } => {
            let room_id = resolve_room(ctx, &room_code).await?;
            ctx.votes.randomize_dj(room_id, caller).await?;
        }
    }

    Ok(())
}

async fn resolve_room(ctx: &ServerContext, room_code: &str) -> Result<RoomId, GatewayError> {
    schemas::validate(&RoomCodeSchema { room_code })?;
    let room = ctx.runtime.repository.find_room_by_code(room_code).await?;
    Ok(room.id)
}

/// Drops everything between `<` and `>` so an embedded `<script>` (or any
/// other tag) never reaches persistence or another connection's broadcast
/// (§4.5). A bare `>` with no preceding `<` passes through untouched.
fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut depth = 0u32;

    for c in input.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }

    out
}

fn parse_id<T>(raw: &str) -> Result<Id<T>, GatewayError> {
    Id::from_str_opaque(raw).ok_or_else(|| GatewayError::Validation(format!("{raw} is not a valid id")))
}

fn ensure_forwarder(
    ctx: &ServerContext,
    room_id: RoomId,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    forwarders: &mut HashMap<RoomId, tokio::task::JoinHandle<()>>,
) {
    if forwarders.contains_key(&room_id) {
        return;
    }

    let mut topic_rx = ctx.runtime.kv.subscribe(&keys::room_topic(room_id));
    let tx = outbound_tx.clone();

    let handle = tokio::spawn(async move {
        loop {
            match topic_rx.recv().await {
                Ok(json) => {
                    if tx.send(Message::Text(json)).is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    forwarders.insert(room_id, handle);
}

fn send_one(outbound_tx: &mpsc::UnboundedSender<Message>, wire: &WireOutbound) {
    if let Ok(json) = serde_json::to_string(wire) {
        let _ = outbound_tx.send(Message::Text(json));
    }
}

fn error_message(err: &GatewayError) -> Message {
    let wire = WireOutbound::Error {
        code: err.code().as_str().to_string(),
        message: err.to_string(),
    };
    Message::Text(serde_json::to_string(&wire).expect("WireOutbound::Error serializes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_drops_tags_and_their_content_markers() {
        assert_eq!(strip_html("hello <script>alert(1)</script> world"), "hello alert(1) world");
        assert_eq!(strip_html("<b>bold</b>"), "bold");
        assert_eq!(strip_html("no tags here"), "no tags here");
    }
}
