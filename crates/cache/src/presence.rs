//! Presence tracking with a coalescing batch flush.
//!
//! Status updates are appended to an in-memory queue and flushed to the
//! system of record every 5 seconds, grouped by target status so each group
//! lands in a single statement. The KV status key is written eagerly with a
//! short TTL, so a peer polling status sees the change immediately while a
//! crashed batch can never leave "online" stuck forever.

use std::{collections::HashMap, time::Duration};

use {
    tinchat_common::types::UserStatus,
    tinchat_store::ProfileStore,
    tokio::sync::{mpsc, oneshot},
    tracing::{debug, warn},
};

use crate::kv::KvClient;

pub const BATCH_INTERVAL: Duration = Duration::from_secs(5);
/// TTL on the eager KV status key; bounds staleness after a crash.
pub const STATUS_KEY_TTL: Duration = Duration::from_secs(90);
/// The housekeeping sweep marks users offline after this much idle time.
pub const OFFLINE_AFTER_MINUTES: i64 = 10;

fn status_key(user: &str) -> String {
    format!("presence:status:{user}")
}

/// Read the eagerly-written status key, if the remote tier has one.
pub async fn cached_status(kv: &KvClient, user: &str) -> Option<UserStatus> {
    let raw = kv.get(&status_key(user)).await?;
    UserStatus::parse(&raw)
}

enum Command {
    Update { user: String, status: UserStatus },
    Shutdown(oneshot::Sender<()>),
}

/// Cheap cloneable handle feeding the batcher task.
#[derive(Clone)]
pub struct PresenceHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PresenceHandle {
    /// Queue a status change. Fire-and-forget; ordering per user is
    /// preserved and the last status in a batch window wins.
    pub fn update(&self, user: impl Into<String>, status: UserStatus) {
        let _ = self.tx.send(Command::Update {
            user: user.into(),
            status,
        });
    }

    /// Drain the queue by setting every queued user offline in one batch,
    /// then stop the task. Resolves when the final flush is done.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

pub struct PresenceBatcher;

impl PresenceBatcher {
    /// Spawn the batcher task. Without a system of record the task still
    /// maintains the eager KV keys.
    pub fn spawn(
        store: Option<ProfileStore>,
        kv: KvClient,
    ) -> (PresenceHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(store, kv, rx));
        (PresenceHandle { tx }, handle)
    }
}

async fn run(
    store: Option<ProfileStore>,
    kv: KvClient,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: Vec<(String, UserStatus)> = Vec::new();
    let mut interval = tokio::time::interval(BATCH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await; // skip immediate first tick

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Update { user, status }) => {
                    if kv.is_connected() {
                        kv.set(&status_key(&user), status.as_str(), STATUS_KEY_TTL).await;
                    }
                    pending.push((user, status));
                },
                Some(Command::Shutdown(ack)) => {
                    drain_offline(&store, &kv, &mut pending).await;
                    let _ = ack.send(());
                    return;
                },
                None => {
                    drain_offline(&store, &kv, &mut pending).await;
                    return;
                },
            },
            _ = interval.tick() => {
                flush(&store, &mut pending).await;
            },
        }
    }
}

/// Flush the queue: last status wins per user, one statement per status
/// group. Failed groups are re-queued for the next window.
async fn flush(store: &Option<ProfileStore>, pending: &mut Vec<(String, UserStatus)>) {
    if pending.is_empty() {
        return;
    }
    let groups = group_by_status(std::mem::take(pending));
    let Some(store) = store else {
        return;
    };
    for (status, users) in groups {
        match store.update_status_bulk(status, &users).await {
            Ok(rows) => {
                debug!(status = %status, users = users.len(), rows, "presence batch flushed");
            },
            Err(e) => {
                warn!(status = %status, error = %e, "presence batch failed, re-queueing");
                pending.extend(users.into_iter().map(|u| (u, status)));
            },
        }
    }
}

/// Final drain on shutdown: everyone still queued goes offline in a single
/// statement.
async fn drain_offline(
    store: &Option<ProfileStore>,
    kv: &KvClient,
    pending: &mut Vec<(String, UserStatus)>,
) {
    if pending.is_empty() {
        return;
    }
    let users: Vec<String> = group_by_status(std::mem::take(pending))
        .into_values()
        .flatten()
        .collect();
    if kv.is_connected() {
        for user in &users {
            kv.set(&status_key(user), UserStatus::Offline.as_str(), STATUS_KEY_TTL)
                .await;
        }
    }
    if let Some(store) = store {
        match store.update_status_bulk(UserStatus::Offline, &users).await {
            Ok(rows) => debug!(users = users.len(), rows, "presence drained offline"),
            Err(e) => warn!(error = %e, "final presence drain failed"),
        }
    }
}

/// Last-wins dedupe by user, then group by target status. Guarantees at most
/// one entry per `(user, status)` pair per flush.
fn group_by_status(pending: Vec<(String, UserStatus)>) -> HashMap<UserStatus, Vec<String>> {
    let mut latest: HashMap<String, UserStatus> = HashMap::new();
    for (user, status) in pending {
        latest.insert(user, status);
    }
    let mut groups: HashMap<UserStatus, Vec<String>> = HashMap::new();
    for (user, status) in latest {
        groups.entry(status).or_default().push(user);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_status_wins_within_a_batch() {
        let pending = vec![
            ("u1".to_string(), UserStatus::Online),
            ("u1".to_string(), UserStatus::Idle),
            ("u2".to_string(), UserStatus::Online),
        ];
        let groups = group_by_status(pending);
        assert_eq!(groups.get(&UserStatus::Idle).map(Vec::len), Some(1));
        assert_eq!(groups.get(&UserStatus::Online).map(Vec::len), Some(1));
        assert!(!groups.contains_key(&UserStatus::Offline));
    }

    #[test]
    fn duplicate_updates_collapse_to_one() {
        let pending = vec![
            ("u1".to_string(), UserStatus::Online),
            ("u1".to_string(), UserStatus::Online),
        ];
        let groups = group_by_status(pending);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&UserStatus::Online], vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn shutdown_resolves_without_store() {
        let (handle, task) = PresenceBatcher::spawn(None, KvClient::disabled());
        handle.update("u1", UserStatus::Online);
        handle.update("u2", UserStatus::Online);
        handle.shutdown().await;
        task.await.unwrap();
    }
}
