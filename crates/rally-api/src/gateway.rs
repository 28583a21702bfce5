use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use rally_engine::Engine;
use rally_gateway::ChannelId;
use rally_types::error::Error;
use rally_types::events::GatewayCommand;
use rally_types::models::PartyId;

use crate::auth::{AppState, verify_token};

/// Server sends a Ping every 15 seconds. Two missed Pongs (~30s) drop the
/// connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_HEARTBEATS: u8 = 2;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// Authenticate at the HTTP upgrade, so the socket starts out bound to a
/// party. Browsers cannot set headers on WebSocket requests, hence `?token=`.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token = query
        .token
        .as_deref()
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = verify_token(&state.jwt_secret, token).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let engine = state.engine.clone();
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, engine, claims.sub)))
}

/// Unregisters the channel however the connection ends, including when the
/// connection future is dropped mid-await.
struct SessionGuard {
    engine: Engine,
    party: PartyId,
    channel: ChannelId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let engine = self.engine.clone();
        let (party, channel) = (self.party, self.channel);
        tokio::spawn(async move {
            engine.close_session(party, channel).await;
        });
    }
}

/// Drive one authenticated socket: frames queued for this channel go out,
/// commands come in, and a heartbeat detects dead peers.
pub async fn handle_connection(socket: WebSocket, engine: Engine, party: PartyId) {
    let (mut sender, mut receiver) = socket.split();

    let mut conn = engine.open_session(party).await;
    let channel = conn.channel;
    let _guard = SessionGuard {
        engine: engine.clone(),
        party,
        channel,
    };
    info!("Party {} connected to gateway on channel {}", party, channel);

    let write_timeout = engine.dispatcher().config().send_timeout;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = conn.frames.recv() => {
                    // None once the dispatcher has dropped this channel.
                    let Some(frame) = frame else { break };
                    let msg = Message::Text(frame.to_string().into());
                    if !write(&mut sender, msg, write_timeout).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if !write(&mut sender, Message::Ping(Vec::new().into()), write_timeout).await {
                        break;
                    }
                }
            }
        }

        let _ = tokio::time::timeout(write_timeout, sender.close()).await;
    });

    let engine_recv = engine.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let result = match serde_json::from_str::<GatewayCommand>(&text) {
                        Ok(cmd) => engine_recv.handle_command(party, cmd).await,
                        Err(e) => Err(Error::InvalidRequest(format!("unrecognized command: {}", e))),
                    };
                    if let Err(e) = result {
                        debug!("Party {} command rejected: {}", party, e);
                        engine_recv.reject_command(party, channel, &e).await;
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Party {} disconnected from gateway (channel {})", party, channel);
}

async fn write(sink: &mut SplitSink<WebSocket, Message>, msg: Message, deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, sink.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("Socket write failed: {}", e);
            false
        }
        Err(_) => {
            warn!("Socket write exceeded {:?}, dropping connection", deadline);
            false
        }
    }
}
