//! Remote-tier caches for the friendship graph.
//!
//! All of these live only in the KV store: the values are shared across
//! gateway instances and the invalidation rules are cross-user, which an
//! in-process tier cannot honor. When the KV client is down every lookup is
//! a miss and callers compute fresh from the system of record.

use std::time::Duration;

use {
    serde::{Serialize, de::DeserializeOwned},
    tinchat_common::types::FriendshipStatus,
    tracing::debug,
};

use crate::{entry::CacheEntry, kv::KvClient};

pub const FRIENDS_LIST_TTL: Duration = Duration::from_secs(300);
pub const ONLINE_COUNT_TTL: Duration = Duration::from_secs(30);
pub const PENDING_TTL: Duration = Duration::from_secs(600);
pub const MUTUAL_TTL: Duration = Duration::from_secs(900);
pub const STATUS_TTL: Duration = Duration::from_secs(30);

/// How many mutual-friends keys we track per user for invalidation.
const MUTUAL_INDEX_CAP: i64 = 256;

#[derive(Debug, Clone, Copy)]
pub enum PendingDirection {
    Received,
    Sent,
}

impl PendingDirection {
    fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Sent => "sent",
        }
    }
}

fn list_key(user: &str) -> String {
    format!("friends:list:{user}")
}
fn online_count_key(user: &str) -> String {
    format!("friends:online:{user}")
}
fn pending_key(user: &str, direction: PendingDirection) -> String {
    format!("friends:pending:{}:{user}", direction.as_str())
}
fn mutual_key(a: &str, b: &str) -> String {
    format!("friends:mutual:{a}:{b}")
}
fn mutual_index_key(user: &str) -> String {
    format!("friends:mutualidx:{user}")
}
fn status_key(a: &str, b: &str) -> String {
    format!("friends:status:{a}:{b}")
}

#[derive(Clone)]
pub struct FriendsCache {
    kv: KvClient,
}

impl FriendsCache {
    #[must_use]
    pub fn new(kv: KvClient) -> Self {
        Self { kv }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.kv.is_connected() {
            return None;
        }
        let raw = self.kv.get(key).await?;
        match CacheEntry::<T>::decode_fresh(&raw) {
            Some(entry) => Some(entry.value),
            None => {
                self.kv.del(key).await;
                None
            },
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if !self.kv.is_connected() {
            return;
        }
        let entry = CacheEntry {
            value,
            cached_at: tinchat_common::now_ms(),
            ttl_secs: ttl.as_secs(),
            version: crate::entry::CACHE_SCHEMA_VERSION,
        };
        if let Ok(raw) = serde_json::to_string(&entry) {
            self.kv.set(key, &raw, ttl).await;
        }
    }

    // ── Friends list ─────────────────────────────────────────────────────

    pub async fn friends_list(&self, user: &str) -> Option<Vec<serde_json::Value>> {
        self.get_json(&list_key(user)).await
    }

    pub async fn set_friends_list(&self, user: &str, friends: &[serde_json::Value]) {
        self.set_json(&list_key(user), &friends, FRIENDS_LIST_TTL)
            .await;
    }

    pub async fn invalidate_friends_list(&self, user: &str) {
        self.kv.del(&list_key(user)).await;
    }

    // ── Online count ─────────────────────────────────────────────────────

    pub async fn online_count(&self, user: &str) -> Option<i64> {
        self.get_json(&online_count_key(user)).await
    }

    pub async fn set_online_count(&self, user: &str, count: i64) {
        self.set_json(&online_count_key(user), &count, ONLINE_COUNT_TTL)
            .await;
    }

    // ── Pending requests ─────────────────────────────────────────────────

    pub async fn pending(
        &self,
        user: &str,
        direction: PendingDirection,
    ) -> Option<Vec<serde_json::Value>> {
        self.get_json(&pending_key(user, direction)).await
    }

    pub async fn set_pending(
        &self,
        user: &str,
        direction: PendingDirection,
        requests: &[serde_json::Value],
    ) {
        self.set_json(&pending_key(user, direction), &requests, PENDING_TTL)
            .await;
    }

    // ── Mutual friends ───────────────────────────────────────────────────

    pub async fn mutual_friends(&self, a: &str, b: &str) -> Option<Vec<String>> {
        self.get_json(&mutual_key(a, b)).await
    }

    /// Cache a mutual-friends result and index the key under both users so
    /// graph mutations can find and drop it.
    pub async fn set_mutual_friends(&self, a: &str, b: &str, mutuals: &[String]) {
        let key = mutual_key(a, b);
        self.set_json(&key, &mutuals, MUTUAL_TTL).await;
        for user in [a, b] {
            let index = mutual_index_key(user);
            self.kv.list_push(&index, &key).await;
            self.kv.list_trim(&index, -MUTUAL_INDEX_CAP, -1).await;
            self.kv.expire(&index, MUTUAL_TTL).await;
        }
    }

    // ── Friendship status ────────────────────────────────────────────────

    pub async fn friendship_status(&self, user: &str, other: &str) -> Option<FriendshipStatus> {
        let raw: String = self.get_json(&status_key(user, other)).await?;
        FriendshipStatus::parse(&raw)
    }

    /// Writing `(A,B)` also writes the inverted `(B,A)` view.
    pub async fn set_friendship_status(
        &self,
        user: &str,
        other: &str,
        status: FriendshipStatus,
    ) {
        self.set_json(
            &status_key(user, other),
            &status.as_str().to_string(),
            STATUS_TTL,
        )
        .await;
        self.set_json(
            &status_key(other, user),
            &status.inverted().as_str().to_string(),
            STATUS_TTL,
        )
        .await;
    }

    // ── Graph-mutation invalidation ──────────────────────────────────────

    /// Invalidate everything a graph mutation
    /// (send/accept/decline/remove/block/unblock) touching `(a, b)` can have
    /// staled: both friends lists, both status orientations, both users'
    /// pending sets, and every mutual-friends entry mentioning either user.
    pub async fn invalidate_pair(&self, a: &str, b: &str) {
        if !self.kv.is_connected() {
            return;
        }
        let mut keys = vec![
            list_key(a),
            list_key(b),
            status_key(a, b),
            status_key(b, a),
            pending_key(a, PendingDirection::Received),
            pending_key(a, PendingDirection::Sent),
            pending_key(b, PendingDirection::Received),
            pending_key(b, PendingDirection::Sent),
            online_count_key(a),
            online_count_key(b),
        ];

        for user in [a, b] {
            let index = mutual_index_key(user);
            let mutual_keys = self.kv.list_range(&index).await;
            keys.extend(mutual_keys);
            keys.push(index);
        }

        debug!(a, b, keys = keys.len(), "invalidating friendship caches");
        self.kv.del_many(&keys).await;
    }
}
