//! Event-socket plane: one task per connection.
//!
//! Lifecycle: upgrade → register (socket id assigned) → optional identity
//! attach → event loop → cleanup. A write loop forwards frames from the
//! session manager's channel to the socket; the read loop validates each
//! inbound frame against its schema before dispatch. Per-socket inbound
//! ordering is preserved because dispatch is sequential within this task.

use std::net::SocketAddr;

use {
    axum::{
        extract::{
            ConnectInfo, Query, State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        response::Response,
    },
    futures::{SinkExt, stream::StreamExt},
    metrics::counter,
    tinchat_auth::VerifyOutcome,
    tinchat_common::types::UserStatus,
    tinchat_protocol::{
        ClientFrame, MAX_PAYLOAD_BYTES, ServerFrame, events, inbound, outbound, schema,
    },
    tinchat_sessions::AttachedProfile,
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::state::AppState;

#[derive(serde::Deserialize, Default)]
pub struct WsQuery {
    #[serde(default)]
    token: Option<String>,
}

pub async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
    headers: http::HeaderMap,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state, addr, headers, query))
}

async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    remote_addr: SocketAddr,
    headers: http::HeaderMap,
    query: WsQuery,
) {
    let socket_id = uuid::Uuid::new_v4().to_string();
    info!(socket_id = %socket_id, remote_ip = %remote_addr.ip(), "ws: new connection");
    counter!("tinchat_ws_connections_total").increment(1);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: forwards frames from the session manager to the socket.
    let write_socket_id = socket_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                debug!(socket_id = %write_socket_id, "ws: write loop closed");
                break;
            }
        }
    });

    let close = state.sessions.register(&socket_id, frame_tx.clone()).await;

    // ── Identity attach ──────────────────────────────────────────────────
    // Missing credentials demote silently to anonymous; invalid ones get an
    // error event but the socket stays usable anonymously.
    let query_string = query.token.as_deref().map(|t| format!("token={t}"));
    let credential = tinchat_auth::extract_credential(&headers, query_string.as_deref());
    if let (Some(verifier), Some(credential)) = (&state.verifier, credential) {
        match verifier.verify(&credential).await {
            VerifyOutcome::Verified(identity) => {
                let shape = fetch_attached_profile(&state, &identity.user_id).await;
                state
                    .sessions
                    .attach_identity(&socket_id, &identity.user_id, shape)
                    .await;
                info!(socket_id = %socket_id, auth_id = %identity.user_id, "ws: identity attached");
            },
            VerifyOutcome::Invalid => {
                warn!(socket_id = %socket_id, "ws: invalid credential, continuing anonymous");
                let _ = frame_tx.send(
                    ServerFrame::failure(outbound::ERROR, "invalid credential").to_wire(),
                );
            },
            VerifyOutcome::TryAgain => {
                warn!(socket_id = %socket_id, "ws: identity provider unavailable");
                let _ = frame_tx.send(
                    ServerFrame::failure(outbound::ERROR, "authentication unavailable, try again")
                        .to_wire(),
                );
            },
        }
    }

    // ── Event loop ───────────────────────────────────────────────────────

    loop {
        let message = tokio::select! {
            msg = ws_rx.next() => msg,
            _ = close.cancelled() => {
                debug!(socket_id = %socket_id, "ws: force-closed");
                break;
            },
            _ = state.cancel.cancelled() => {
                debug!(socket_id = %socket_id, "ws: server shutting down");
                break;
            },
        };
        let text = match message {
            Some(Ok(Message::Text(t))) => t.to_string(),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(socket_id = %socket_id, error = %e, "ws: read error");
                break;
            },
        };

        if text.len() > MAX_PAYLOAD_BYTES {
            warn!(socket_id = %socket_id, size = text.len(), "ws: payload too large");
            let _ = frame_tx
                .send(ServerFrame::failure(outbound::ERROR, "payload too large").to_wire());
            continue;
        }

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(socket_id = %socket_id, error = %e, "ws: invalid frame");
                let _ = frame_tx
                    .send(ServerFrame::failure(outbound::ERROR, "invalid frame").to_wire());
                continue;
            },
        };

        if let Some(reply) = dispatch(&state, &socket_id, &frame).await {
            let _ = frame_tx.send(reply.to_wire());
        }
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    state.sessions.disconnect(&socket_id).await;
    drop(frame_tx);
    write_handle.abort();
    info!(socket_id = %socket_id, "ws: connection closed");
}

async fn fetch_attached_profile(state: &AppState, auth_id: &str) -> AttachedProfile {
    let Some(profile) = state.profile_manager.read_profile(auth_id).await else {
        return AttachedProfile::default();
    };
    let rainbow_speed = u8::try_from(profile.rainbow_speed).ok();
    AttachedProfile {
        username: Some(profile.username.clone()),
        display_name: profile.display_name.clone(),
        display_name_color: profile.display_name_color.clone(),
        display_name_animation: Some(profile.display_name_animation.clone()),
        rainbow_speed,
        pronouns: profile.pronouns.clone(),
        avatar_url: profile.avatar_url.clone(),
        badges: profile.badges.0.clone(),
    }
}

/// Validate and route one inbound event. Returns the frame to answer with,
/// if any. Validation failures answer on the same event channel and mutate
/// nothing.
async fn dispatch(state: &AppState, socket_id: &str, frame: &ClientFrame) -> Option<ServerFrame> {
    let Some(event_schema) = schema::for_event(&frame.event) else {
        debug!(socket_id, event = %frame.event, "ws: unknown event");
        return Some(ServerFrame::failure(
            outbound::ERROR,
            format!("unknown event: {}", frame.event),
        ));
    };
    if let Err(e) = event_schema.validate(&frame.data) {
        debug!(socket_id, event = %frame.event, error = %e, "ws: validation failed");
        return Some(ServerFrame::failure(&frame.event, e.to_string()));
    }

    match frame.event.as_str() {
        inbound::FIND_PARTNER => {
            let params: events::FindPartnerParams = parse(&frame.data)?;
            match state.sessions.find_partner(socket_id, &params).await {
                Ok(tinchat_sessions::FindPartnerResult::Matched { .. }) => {
                    counter!("tinchat_matches_total").increment(1);
                    None
                },
                Ok(tinchat_sessions::FindPartnerResult::Queued) => None,
                Err(e) => Some(ServerFrame::failure(&frame.event, e)),
            }
        },
        inbound::LEAVE_CHAT => {
            let _params: events::LeaveChatParams = parse(&frame.data)?;
            match state.sessions.leave(socket_id).await {
                Ok(()) => None,
                Err(e) => Some(ServerFrame::failure(&frame.event, e)),
            }
        },
        inbound::SEND_MESSAGE => {
            let params: events::SendMessageParams = parse(&frame.data)?;
            match state.sessions.relay_message(socket_id, &params).await {
                Ok(()) => {
                    counter!("tinchat_messages_relayed_total").increment(1);
                    None
                },
                Err(e) => Some(ServerFrame::failure(&frame.event, e)),
            }
        },
        inbound::WEBRTC_SIGNAL => {
            let params: events::WebrtcSignalParams = parse(&frame.data)?;
            match state
                .sessions
                .relay_signal(socket_id, &params.room_id, &params.signal_data)
                .await
            {
                Ok(()) => None,
                Err(e) => Some(ServerFrame::failure(&frame.event, e)),
            }
        },
        inbound::TYPING_START | inbound::TYPING_STOP => {
            let start = frame.event == inbound::TYPING_START;
            match state.sessions.relay_typing(socket_id, start).await {
                Ok(()) => None,
                // Typing races teardown constantly; failures are not worth an
                // error frame.
                Err(e) => {
                    debug!(socket_id, error = %e, "typing relay failed");
                    None
                },
            }
        },
        inbound::STATUS_UPDATE => {
            let params: events::StatusUpdateParams = parse(&frame.data)?;
            match state.sessions.update_status(socket_id, params.status).await {
                Ok(()) => {
                    if params.status == UserStatus::Offline {
                        debug!(socket_id, "user went offline by request");
                    }
                    None
                },
                Err(e) => Some(ServerFrame::failure(&frame.event, e)),
            }
        },
        _ => None,
    }
}

/// Deserialize after schema validation; a failure here is a programmer
/// error (schema and struct disagree), reported but not fatal.
fn parse<T: serde::de::DeserializeOwned>(data: &serde_json::Value) -> Option<T> {
    match serde_json::from_value(data.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "schema accepted a payload the type rejected");
            None
        },
    }
}
