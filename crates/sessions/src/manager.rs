//! The session manager: socket registry, room registry, relay, teardown.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use {
    tinchat_cache::{KvClient, PresenceHandle},
    tinchat_common::{now_ms, types::UserStatus},
    tinchat_matchmaker::{Matchmaker, QueuedUser},
    tinchat_protocol::{
        TYPING_MIRROR_TTL_SECS,
        events::{FindPartnerParams, MessageOut, PartnerFound, SendMessageParams},
        frames::ServerFrame,
        outbound, sanitize,
    },
    tinchat_store::MessageStore,
    tokio::sync::{RwLock, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use crate::{room::Room, user::SessionUser};

struct Connection {
    user: SessionUser,
    /// Serialized frames headed for this socket's write loop.
    sender: mpsc::UnboundedSender<String>,
    /// Cancelled to force-close the socket (auth takeover, failed ping).
    close: CancellationToken,
}

impl Connection {
    fn send(&self, frame: &ServerFrame) -> bool {
        self.sender.send(frame.to_wire()).is_ok()
    }
}

#[derive(Default)]
struct Registries {
    connections: HashMap<String, Connection>,
    /// socket id → room id back-index.
    socket_room: HashMap<String, String>,
    rooms: HashMap<String, Room>,
    /// auth id → socket id, latest wins.
    auth_index: HashMap<String, String>,
}

impl Registries {
    /// Tear down the room containing `socket_id`, notifying the peer.
    /// Registry lookups and mutations stay inside the caller's write guard.
    fn teardown_room(&mut self, socket_id: &str) -> Option<Room> {
        let room_id = self.socket_room.remove(socket_id)?;
        let room = self.rooms.remove(&room_id)?;
        for member in &room.members {
            self.socket_room.remove(member);
            if member.as_str() != socket_id {
                if let Some(peer) = self.connections.get(member) {
                    peer.send(&ServerFrame::new(
                        outbound::PARTNER_LEFT,
                        serde_json::json!({ "roomId": room.id }),
                    ));
                }
            }
        }
        Some(room)
    }
}

/// What `findPartner` produced.
#[derive(Debug)]
pub enum FindPartnerResult {
    /// A room was created; both sockets have been notified.
    Matched { room_id: String },
    /// No compatible candidate yet; the user waits in the queue.
    Queued,
}

pub struct SessionManager {
    inner: RwLock<Registries>,
    matchmaker: Arc<Matchmaker>,
    presence: PresenceHandle,
    kv: KvClient,
    messages: Option<MessageStore>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        matchmaker: Arc<Matchmaker>,
        presence: PresenceHandle,
        kv: KvClient,
        messages: Option<MessageStore>,
    ) -> Self {
        Self {
            inner: RwLock::new(Registries::default()),
            matchmaker,
            presence,
            kv,
            messages,
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────────────

    /// Register a freshly opened socket. Returns the close token the socket
    /// task must watch.
    pub async fn register(
        &self,
        socket_id: &str,
        sender: mpsc::UnboundedSender<String>,
    ) -> CancellationToken {
        let close = CancellationToken::new();
        let connection = Connection {
            user: SessionUser::new(socket_id),
            sender,
            close: close.clone(),
        };
        self.inner
            .write()
            .await
            .connections
            .insert(socket_id.to_string(), connection);
        debug!(socket_id, "socket registered");
        close
    }

    /// Attach a verified identity to a socket. Any prior socket holding the
    /// same auth id receives `replaced` and is force-closed: one live socket
    /// per user.
    pub async fn attach_identity(
        &self,
        socket_id: &str,
        auth_id: &str,
        shape: AttachedProfile,
    ) {
        let mut inner = self.inner.write().await;

        if let Some(prior_socket) = inner
            .auth_index
            .insert(auth_id.to_string(), socket_id.to_string())
        {
            if prior_socket != socket_id {
                if let Some(prior) = inner.connections.get(&prior_socket) {
                    info!(auth_id, prior_socket, "evicting prior socket for auth id");
                    prior.send(&ServerFrame::new(
                        outbound::REPLACED,
                        serde_json::json!({ "reason": "newer connection" }),
                    ));
                    prior.close.cancel();
                }
            }
        }

        if let Some(connection) = inner.connections.get_mut(socket_id) {
            let user = &mut connection.user;
            user.auth_id = Some(auth_id.to_string());
            user.username = shape.username;
            user.display_name = shape.display_name;
            user.display_name_color = shape.display_name_color;
            user.display_name_animation = shape.display_name_animation;
            user.rainbow_speed = shape.rainbow_speed;
            user.pronouns = shape.pronouns;
            user.avatar_url = shape.avatar_url;
            user.badges = shape.badges;
        }
        drop(inner);

        self.presence.update(auth_id, UserStatus::Online);
    }

    /// Full cleanup for a departed socket: dequeue, room teardown with
    /// `partner-left`, registry removal, presence offline.
    pub async fn disconnect(&self, socket_id: &str) {
        let (auth_id, had_room) = {
            let mut inner = self.inner.write().await;
            let room = inner.teardown_room(socket_id);
            let connection = inner.connections.remove(socket_id);
            let auth_id = connection.map(|c| c.user.auth_id).unwrap_or_default();
            if let Some(auth) = &auth_id {
                // Only drop the reverse index if this socket still owns it; a
                // takeover may already have repointed it.
                if inner.auth_index.get(auth) == Some(&socket_id.to_string()) {
                    inner.auth_index.remove(auth);
                }
            }
            (auth_id, room.is_some())
        };

        self.matchmaker.remove(socket_id, auth_id.as_deref()).await;
        let history_key = auth_id.clone().unwrap_or_else(|| socket_id.to_string());
        self.matchmaker.record_disconnect(&history_key).await;

        if let Some(auth) = auth_id {
            self.presence.update(auth, UserStatus::Offline);
        }
        debug!(socket_id, had_room, "socket disconnected");
    }

    // ── Matchmaking ──────────────────────────────────────────────────────

    /// Enqueue and attempt an immediate match. On success the room exists
    /// and both peers have received `partner-found` before this returns.
    pub async fn find_partner(
        &self,
        socket_id: &str,
        params: &FindPartnerParams,
    ) -> Result<FindPartnerResult, String> {
        let interests = sanitize::normalize_interests(&params.interests);

        // Stamp session state and snapshot the queue entry in one guard.
        let snapshot = {
            let mut inner = self.inner.write().await;
            if inner.socket_room.contains_key(socket_id) {
                return Err("already in a chat".into());
            }
            let connection = inner
                .connections
                .get_mut(socket_id)
                .ok_or("socket not registered")?;
            let user = &mut connection.user;
            user.chat_type = Some(params.chat_type);
            user.interests = interests.clone();

            let mut entry = QueuedUser::new(socket_id, params.chat_type)
                .with_interests(interests);
            entry.connection_start = user.connection_start;
            entry.display_name = user.display_name.clone();
            entry.has_avatar = user.has_avatar();
            entry.pronouns = user.pronouns.clone();
            entry.badge_count = user.badges.len();
            if let Some(auth) = &user.auth_id {
                entry = entry.with_auth(auth.clone());
            }
            entry
        };

        self.matchmaker
            .enqueue(snapshot.clone())
            .await
            .map_err(|e| e.to_string())?;

        let Some(outcome) = self.matchmaker.try_match(socket_id).await else {
            return Ok(FindPartnerResult::Queued);
        };

        // Commit the room. The peer may have vanished between selection and
        // here; if so, put the seeker back and keep waiting.
        let mut inner = self.inner.write().await;
        if !inner.connections.contains_key(&outcome.peer.socket_id) {
            drop(inner);
            warn!(
                peer = %outcome.peer.socket_id,
                "matched peer no longer connected, re-queueing seeker"
            );
            let _ = self.matchmaker.enqueue(snapshot).await;
            return Ok(FindPartnerResult::Queued);
        }

        let common = sanitize::common_interests(&outcome.seeker.interests, &outcome.peer.interests);
        let room = Room::create(
            params.chat_type,
            [
                outcome.seeker.socket_id.clone(),
                outcome.peer.socket_id.clone(),
            ],
            [outcome.seeker.auth_id.clone(), outcome.peer.auth_id.clone()],
            common.clone(),
        );
        let room_id = room.id.clone();
        for member in &room.members {
            inner
                .socket_room
                .insert(member.clone(), room_id.clone());
        }
        inner.rooms.insert(room_id.clone(), room);

        // Notify both sides with the other's display shape.
        for (member, other) in [
            (&outcome.seeker.socket_id, &outcome.peer.socket_id),
            (&outcome.peer.socket_id, &outcome.seeker.socket_id),
        ] {
            let (peer_shape, peer_interests) = match inner.connections.get(other) {
                Some(c) => (c.user.peer_shape(), c.user.interests.clone()),
                None => continue,
            };
            let found = PartnerFound {
                room_id: room_id.clone(),
                chat_type: params.chat_type,
                peer: peer_shape,
                peer_interests,
                common_interests: common.clone(),
            };
            if let Some(connection) = inner.connections.get(member) {
                connection.send(&ServerFrame::new(
                    outbound::PARTNER_FOUND,
                    serde_json::to_value(&found).unwrap_or_default(),
                ));
            }
        }

        info!(room_id = %room_id, score = outcome.score, "room created");
        Ok(FindPartnerResult::Matched { room_id })
    }

    // ── Relay ────────────────────────────────────────────────────────────

    /// Sanitize and forward a message to the other room member only. The
    /// per-socket write channel preserves send order.
    pub async fn relay_message(
        &self,
        socket_id: &str,
        params: &SendMessageParams,
    ) -> Result<(), String> {
        let Some(text) = sanitize::sanitize_message(&params.message) else {
            return Err("message: empty after sanitization".into());
        };

        let (message, peer_ok, room_id, sender_auth) = {
            let inner = self.inner.read().await;
            let room_id = inner
                .socket_room
                .get(socket_id)
                .ok_or("no active chat room")?;
            let room = inner.rooms.get(room_id).ok_or("no active chat room")?;
            let peer_id = room
                .peer_of(socket_id)
                .ok_or("not a member of this room")?;
            let sender = inner
                .connections
                .get(socket_id)
                .ok_or("socket not registered")?;

            let message = MessageOut {
                id: Uuid::new_v4().to_string(),
                room_id: room_id.clone(),
                message: text,
                sender: sender.user.peer_shape(),
                timestamp: now_ms(),
            };
            let peer_ok = inner
                .connections
                .get(peer_id)
                .is_some_and(|peer| {
                    peer.send(&ServerFrame::new(
                        outbound::MESSAGE,
                        serde_json::to_value(&message).unwrap_or_default(),
                    ))
                });
            (
                message,
                peer_ok,
                room_id.clone(),
                sender.user.auth_id.clone(),
            )
        };

        if !peer_ok {
            debug!(room_id, "peer write channel closed during relay");
        }

        // Retention-window persistence is best effort; delivery already
        // happened.
        if let Some(store) = &self.messages {
            if let Err(e) = store
                .insert(&message.id, &room_id, sender_auth.as_deref(), &message.message)
                .await
            {
                warn!(error = %e, "message persistence failed");
            }
        }
        Ok(())
    }

    /// Forward an opaque signaling envelope to the peer.
    pub async fn relay_signal(
        &self,
        socket_id: &str,
        room_id: &str,
        signal_data: &serde_json::Value,
    ) -> Result<(), String> {
        let inner = self.inner.read().await;
        let mapped = inner
            .socket_room
            .get(socket_id)
            .ok_or("no active chat room")?;
        if mapped != room_id {
            return Err("roomId: not a member of this room".into());
        }
        let room = inner.rooms.get(room_id).ok_or("no active chat room")?;
        let peer_id = room.peer_of(socket_id).ok_or("not a member of this room")?;
        let delivered = inner.connections.get(peer_id).is_some_and(|peer| {
            peer.send(&ServerFrame::new(
                outbound::WEBRTC_SIGNAL,
                serde_json::json!({ "roomId": room_id, "signalData": signal_data }),
            ))
        });
        if !delivered {
            return Err("partner unavailable".into());
        }
        Ok(())
    }

    /// Forward a typing indicator; mirrored into the KV store with a short
    /// TTL when connected.
    pub async fn relay_typing(&self, socket_id: &str, start: bool) -> Result<(), String> {
        let (room_id, delivered) = {
            let inner = self.inner.read().await;
            let room_id = inner
                .socket_room
                .get(socket_id)
                .ok_or("no active chat room")?
                .clone();
            let room = inner.rooms.get(&room_id).ok_or("no active chat room")?;
            let peer_id = room.peer_of(socket_id).ok_or("not a member of this room")?;
            let event = if start {
                outbound::TYPING_START
            } else {
                outbound::TYPING_STOP
            };
            let delivered = inner.connections.get(peer_id).is_some_and(|peer| {
                peer.send(&ServerFrame::new(
                    event,
                    serde_json::json!({ "roomId": room_id }),
                ))
            });
            (room_id, delivered)
        };

        if !delivered {
            debug!(room_id, "peer write channel closed during typing relay");
        }

        if self.kv.is_connected() {
            let key = format!("typing:{room_id}:{socket_id}");
            if start {
                self.kv
                    .set(&key, "1", std::time::Duration::from_secs(TYPING_MIRROR_TTL_SECS))
                    .await;
            } else {
                self.kv.del(&key).await;
            }
        }
        Ok(())
    }

    // ── Status & leave ───────────────────────────────────────────────────

    /// Record a status change; authenticated users flow into the presence
    /// batch.
    pub async fn update_status(&self, socket_id: &str, status: UserStatus) -> Result<(), String> {
        let auth_id = {
            let mut inner = self.inner.write().await;
            let connection = inner
                .connections
                .get_mut(socket_id)
                .ok_or("socket not registered")?;
            connection.user.status = status;
            connection.user.auth_id.clone()
        };
        if let Some(auth) = auth_id {
            self.presence.update(auth, status);
        }
        Ok(())
    }

    /// Voluntary leave: tear the room down and dequeue, but keep the socket
    /// registered so the user can `findPartner` again.
    pub async fn leave(&self, socket_id: &str) -> Result<(), String> {
        let auth_id = {
            let mut inner = self.inner.write().await;
            inner.teardown_room(socket_id);
            inner
                .connections
                .get(socket_id)
                .and_then(|c| c.user.auth_id.clone())
        };
        self.matchmaker.remove(socket_id, auth_id.as_deref()).await;
        Ok(())
    }

    // ── Heartbeat & introspection ────────────────────────────────────────

    /// Drop sockets whose write channel has died, then run the matchmaker's
    /// stale sweep with the surviving connected set.
    pub async fn heartbeat_sweep(&self) -> usize {
        let dead: Vec<String> = {
            let inner = self.inner.read().await;
            inner
                .connections
                .iter()
                .filter(|(_, c)| c.sender.is_closed())
                .map(|(id, _)| id.clone())
                .collect()
        };
        for socket_id in &dead {
            warn!(socket_id, "dropping unresponsive socket");
            if let Some(connection) = self.inner.read().await.connections.get(socket_id) {
                connection.close.cancel();
            }
            self.disconnect(socket_id).await;
        }

        let connected = self.connected_sockets().await;
        self.matchmaker.stale_sweep(&connected).await + dead.len()
    }

    pub async fn connected_sockets(&self) -> HashSet<String> {
        self.inner
            .read()
            .await
            .connections
            .keys()
            .cloned()
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    /// Room-consistency check: every back-index entry points at a live room
    /// that lists the socket, and vice versa.
    pub async fn registries_consistent(&self) -> bool {
        let inner = self.inner.read().await;
        let forward_ok = inner.socket_room.iter().all(|(socket, room_id)| {
            inner
                .rooms
                .get(room_id)
                .is_some_and(|room| room.contains(socket))
        });
        let reverse_ok = inner.rooms.values().all(|room| {
            room.members
                .iter()
                .all(|m| inner.socket_room.get(m) == Some(&room.id))
        });
        forward_ok && reverse_ok
    }
}

/// Display data attached to a socket after identity verification, fetched
/// through the profile cache.
#[derive(Debug, Clone, Default)]
pub struct AttachedProfile {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub display_name_color: Option<String>,
    pub display_name_animation: Option<String>,
    pub rainbow_speed: Option<u8>,
    pub pronouns: Option<String>,
    pub avatar_url: Option<String>,
    pub badges: Vec<tinchat_common::types::Badge>,
}
