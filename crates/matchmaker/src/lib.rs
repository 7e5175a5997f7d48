//! Partner selection over two typed queues.
//!
//! One `text` and one `video` queue, ordered by enqueue time. A seeker's
//! candidates pass the rejection filter, get scored, and the argmax wins;
//! scoring is pure CPU over the in-memory queue, and all state mutations for
//! one operation happen under a single lock acquisition. Queues are
//! optionally mirrored into the KV store so a restart does not lose queued
//! users.

pub mod entry;
pub mod error;
pub mod health;
pub mod history;
pub mod score;

use std::collections::{HashMap, HashSet, VecDeque};

use {
    tinchat_cache::KvClient,
    tinchat_common::{now_ms, types::ChatType},
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

pub use {
    entry::QueuedUser,
    error::{Describe, Error, Result},
    health::QueueHealthReport,
    history::{MatchRecord, SessionHistory},
    score::{RejectReason, filter_candidate, score_candidate},
};

/// Hard cap per queue; the oldest entry is evicted (and recorded as a
/// disconnect) when a 51st arrives.
pub const QUEUE_CAP: usize = 50;
/// Entries waiting longer than this are stale.
pub const STALE_WAIT_MS: i64 = 5 * 60 * 1_000;

fn mirror_key(chat_type: ChatType) -> String {
    format!("matchmaking:queue:{chat_type}")
}

struct QueueSlot {
    user: QueuedUser,
    /// Serialized form pushed to the mirror; kept so removal can LREM the
    /// exact value.
    wire: String,
}

#[derive(Default)]
struct MatchState {
    text: VecDeque<QueueSlot>,
    video: VecDeque<QueueSlot>,
    history: HashMap<String, SessionHistory>,
}

impl MatchState {
    fn queue(&mut self, chat_type: ChatType) -> &mut VecDeque<QueueSlot> {
        match chat_type {
            ChatType::Text => &mut self.text,
            ChatType::Video => &mut self.video,
        }
    }

    fn queues_mut(&mut self) -> [(ChatType, &mut VecDeque<QueueSlot>); 2] {
        [
            (ChatType::Text, &mut self.text),
            (ChatType::Video, &mut self.video),
        ]
    }

    /// Drop every entry matching the socket id or (when present) the auth
    /// id, across both queues. Returns the removed wire blobs per queue for
    /// mirror cleanup.
    fn remove_user(
        &mut self,
        socket_id: &str,
        auth_id: Option<&str>,
    ) -> Vec<(ChatType, String)> {
        let mut removed = Vec::new();
        for (chat_type, queue) in self.queues_mut() {
            queue.retain(|slot| {
                let same_socket = slot.user.socket_id == socket_id;
                let same_auth = match (auth_id, slot.user.auth_id.as_deref()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                };
                if same_socket || same_auth {
                    removed.push((chat_type, slot.wire.clone()));
                    false
                } else {
                    true
                }
            });
        }
        removed
    }

    fn history_entry(&mut self, key: &str) -> &mut SessionHistory {
        self.history.entry(key.to_string()).or_default()
    }
}

/// The outcome of a successful selection: both entries have already been
/// removed from the queue.
#[derive(Debug)]
pub struct MatchOutcome {
    pub seeker: QueuedUser,
    pub peer: QueuedUser,
    pub score: f64,
}

pub struct Matchmaker {
    state: Mutex<MatchState>,
    kv: KvClient,
}

impl Matchmaker {
    #[must_use]
    pub fn new(kv: KvClient) -> Self {
        Self {
            state: Mutex::new(MatchState::default()),
            kv,
        }
    }

    // ── Enqueue ──────────────────────────────────────────────────────────

    /// Insert a user at the tail of their chat type's queue.
    ///
    /// Any prior entry of the same user (by socket id, and by auth id when
    /// present) is removed from both queues first, so queue uniqueness holds
    /// by construction. Rejects entries with no socket id.
    pub async fn enqueue(&self, mut user: QueuedUser) -> Result<()> {
        if user.socket_id.is_empty() {
            return Err(Error::InvalidEntry("socket id is required".into()));
        }
        if user.connection_start == 0 {
            user.connection_start = now_ms();
        }
        if user.enqueued_at == 0 {
            user.enqueued_at = now_ms();
        }

        let wire = serde_json::to_string(&user).describe("encode queue entry")?;
        let chat_type = user.chat_type;

        let mut mirror_removals;
        let mut evicted_key = None;
        {
            let mut state = self.state.lock().await;
            mirror_removals =
                state.remove_user(&user.socket_id, user.auth_id.as_deref());

            let queue = state.queue(chat_type);
            if queue.len() >= QUEUE_CAP {
                if let Some(oldest) = queue.pop_front() {
                    debug!(
                        socket_id = %oldest.user.socket_id,
                        %chat_type,
                        "queue full, evicting oldest"
                    );
                    mirror_removals.push((chat_type, oldest.wire));
                    evicted_key = Some(oldest.user.history_key().to_string());
                }
            }
            queue.push_back(QueueSlot {
                user,
                wire: wire.clone(),
            });
            if let Some(key) = &evicted_key {
                state.history_entry(key).record_disconnect(now_ms());
            }
        }

        for (chat_type, blob) in mirror_removals.drain(..) {
            self.kv.list_remove(&mirror_key(chat_type), &blob).await;
        }
        self.kv.list_push(&mirror_key(chat_type), &wire).await;
        Ok(())
    }

    // ── Selection ────────────────────────────────────────────────────────

    /// Run the filter/score/select pipeline for the queued user with this
    /// socket id. On success both entries leave the queue and history is
    /// updated; `None` means the seeker stays queued.
    pub async fn try_match(&self, socket_id: &str) -> Option<MatchOutcome> {
        let now = now_ms();

        let (outcome, mirror_removals) = {
            let mut state = self.state.lock().await;
            let mut rng = rand::rng();

            let seeker = state
                .text
                .iter()
                .chain(state.video.iter())
                .find(|slot| slot.user.socket_id == socket_id)
                .map(|slot| slot.user.clone())?;
            let chat_type = seeker.chat_type;
            let seeker_history = state
                .history
                .get(seeker.history_key())
                .cloned()
                .unwrap_or_default();
            let empty_history = SessionHistory::default();

            let mut best: Option<(usize, f64, i64)> = None;
            {
                let queue = match chat_type {
                    ChatType::Text => &state.text,
                    ChatType::Video => &state.video,
                };
                for (idx, slot) in queue.iter().enumerate() {
                    let candidate = &slot.user;
                    if candidate.socket_id == seeker.socket_id {
                        continue;
                    }
                    let candidate_history = state
                        .history
                        .get(candidate.history_key())
                        .unwrap_or(&empty_history);
                    if let Err(reason) = filter_candidate(
                        &seeker,
                        candidate,
                        &seeker_history,
                        candidate_history,
                        now,
                    ) {
                        debug!(
                            seeker = %seeker.socket_id,
                            candidate = %candidate.socket_id,
                            ?reason,
                            "candidate rejected"
                        );
                        continue;
                    }
                    let tiebreak: f64 = rand::Rng::random(&mut rng);
                    let score = score_candidate(&seeker, candidate, now, tiebreak);
                    let wait = now - candidate.enqueued_at;
                    let better = match &best {
                        None => true,
                        Some((_, best_score, best_wait)) => {
                            score > *best_score
                                || (score == *best_score && wait > *best_wait)
                        },
                    };
                    if better {
                        best = Some((idx, score, wait));
                    }
                }
            }

            let (winner_idx, score, _) = best?;
            let peer_slot = state.queue(chat_type).remove(winner_idx)?;

            // Final re-validation before committing the pair.
            if !Self::revalidate(&seeker, &peer_slot.user) {
                warn!(
                    seeker = %seeker.socket_id,
                    candidate = %peer_slot.user.socket_id,
                    "pair failed re-validation, returning candidate to queue"
                );
                state.queue(chat_type).push_back(peer_slot);
                return None;
            }

            let mut removals = vec![(chat_type, peer_slot.wire.clone())];
            removals.extend(state.remove_user(&seeker.socket_id, seeker.auth_id.as_deref()));

            let peer = peer_slot.user;
            state
                .history_entry(seeker.history_key())
                .record_match(peer.history_key(), score, &peer.interests, now);
            state
                .history_entry(peer.history_key())
                .record_match(seeker.history_key(), score, &seeker.interests, now);

            (
                MatchOutcome {
                    seeker,
                    peer,
                    score,
                },
                removals,
            )
        };

        for (chat_type, blob) in mirror_removals {
            self.kv.list_remove(&mirror_key(chat_type), &blob).await;
        }

        info!(
            seeker = %outcome.seeker.socket_id,
            peer = %outcome.peer.socket_id,
            score = outcome.score,
            chat_type = %outcome.seeker.chat_type,
            "pair selected"
        );
        Some(outcome)
    }

    /// Self-match is impossible by construction; this is the last line of
    /// defense before a room is created.
    fn revalidate(a: &QueuedUser, b: &QueuedUser) -> bool {
        if a.socket_id == b.socket_id {
            return false;
        }
        match (&a.auth_id, &b.auth_id) {
            (Some(x), Some(y)) => x != y,
            _ => true,
        }
    }

    // ── Removal & history ────────────────────────────────────────────────

    /// Remove a user from both queues (leave/disconnect). Returns whether
    /// anything was removed.
    pub async fn remove(&self, socket_id: &str, auth_id: Option<&str>) -> bool {
        let removals = {
            let mut state = self.state.lock().await;
            state.remove_user(socket_id, auth_id)
        };
        let removed = !removals.is_empty();
        for (chat_type, blob) in removals {
            self.kv.list_remove(&mirror_key(chat_type), &blob).await;
        }
        removed
    }

    /// Note a disconnect for the reconnect-suspicion filter rule.
    pub async fn record_disconnect(&self, history_key: &str) {
        let mut state = self.state.lock().await;
        state.history_entry(history_key).record_disconnect(now_ms());
    }

    /// Preferred interests accumulated from past counterparties.
    pub async fn preferred_interests(&self, history_key: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .history
            .get(history_key)
            .map(|h| h.preferred_interests().to_vec())
            .unwrap_or_default()
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// Drop entries whose socket is not connected or whose wait exceeds the
    /// stale bound. Also prunes expired history. Returns entries removed.
    pub async fn stale_sweep(&self, connected: &HashSet<String>) -> usize {
        let now = now_ms();
        let removals = {
            let mut state = self.state.lock().await;
            let mut removed = Vec::new();
            for (chat_type, queue) in state.queues_mut() {
                queue.retain(|slot| {
                    let stale_wait = now - slot.user.enqueued_at > STALE_WAIT_MS;
                    let gone = !connected.contains(&slot.user.socket_id);
                    if stale_wait || gone {
                        removed.push((chat_type, slot.wire.clone()));
                        false
                    } else {
                        true
                    }
                });
            }
            state.history.retain(|_, h| {
                h.prune(now);
                !h.is_empty()
            });
            removed
        };
        let count = removals.len();
        for (chat_type, blob) in removals {
            self.kv.list_remove(&mirror_key(chat_type), &blob).await;
        }
        if count > 0 {
            debug!(count, "stale sweep removed queue entries");
        }
        count
    }

    /// Queue introspection for the health endpoint.
    pub async fn health(&self) -> QueueHealthReport {
        let state = self.state.lock().await;
        let now = now_ms();
        QueueHealthReport::compute(
            state.text.iter().map(|s| &s.user),
            state.video.iter().map(|s| &s.user),
            now,
        )
    }

    /// Rebuild the in-memory queues from the KV mirror (startup only).
    /// Entries that no longer parse are dropped.
    pub async fn restore_from_mirror(&self) -> usize {
        if !self.kv.is_connected() {
            return 0;
        }
        let mut restored = 0;
        for chat_type in [ChatType::Text, ChatType::Video] {
            let blobs = self.kv.list_range(&mirror_key(chat_type)).await;
            for blob in blobs {
                match serde_json::from_str::<QueuedUser>(&blob) {
                    Ok(user) if user.chat_type == chat_type => {
                        let mut state = self.state.lock().await;
                        state.queue(chat_type).push_back(QueueSlot {
                            user,
                            wire: blob,
                        });
                        restored += 1;
                    },
                    _ => {
                        self.kv.list_remove(&mirror_key(chat_type), &blob).await;
                    },
                }
            }
        }
        if restored > 0 {
            info!(restored, "matchmaking queues restored from mirror");
        }
        restored
    }
}
