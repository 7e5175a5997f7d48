//! Friends-graph operations with cache maintenance.
//!
//! Every mutation goes to the system of record first, then invalidates the
//! affected cache keys (both users' lists, both status orientations, both
//! pending sets, and any mutual-friends entries mentioning either user).

use {
    tinchat_cache::{FriendsCache, KvClient, presence},
    tinchat_common::types::FriendshipStatus,
    tinchat_store::{
        FriendRequestRow, FriendshipStore, FriendStats, PresenceRow, ProfileStore, UserProfile,
        error::Result,
    },
    tracing::debug,
};

pub use tinchat_cache::friends::PendingDirection;

/// The summary shape friends lists are served in.
#[must_use]
pub fn friend_summary(profile: &UserProfile) -> serde_json::Value {
    serde_json::json!({
        "authId": profile.id,
        "username": profile.username,
        "displayName": profile.display_name,
        "avatarUrl": profile.avatar_url,
        "pronouns": profile.pronouns,
        "displayNameColor": profile.display_name_color,
        "displayNameAnimation": profile.display_name_animation,
        "isOnline": profile.is_online,
        "lastSeen": profile.last_seen.timestamp_millis(),
    })
}

#[derive(Clone)]
pub struct FriendsService {
    friendships: FriendshipStore,
    profiles: ProfileStore,
    cache: FriendsCache,
    kv: KvClient,
}

impl FriendsService {
    #[must_use]
    pub fn new(
        friendships: FriendshipStore,
        profiles: ProfileStore,
        cache: FriendsCache,
        kv: KvClient,
    ) -> Self {
        Self {
            friendships,
            profiles,
            cache,
            kv,
        }
    }

    // ── Mutations ────────────────────────────────────────────────────────

    pub async fn send_request(
        &self,
        sender: &str,
        receiver: &str,
        message: Option<&str>,
    ) -> Result<FriendRequestRow> {
        let row = self.friendships.send_request(sender, receiver, message).await?;
        self.cache.invalidate_pair(sender, receiver).await;
        Ok(row)
    }

    pub async fn accept_request(
        &self,
        request_id: &str,
        accepting_user: &str,
    ) -> Result<FriendRequestRow> {
        let row = self
            .friendships
            .accept_request(request_id, accepting_user)
            .await?;
        self.cache
            .invalidate_pair(&row.sender_id, &row.receiver_id)
            .await;
        self.cache
            .set_friendship_status(&row.sender_id, &row.receiver_id, FriendshipStatus::Friends)
            .await;
        Ok(row)
    }

    pub async fn decline_request(
        &self,
        request_id: &str,
        declining_user: &str,
    ) -> Result<FriendRequestRow> {
        let row = self
            .friendships
            .decline_request(request_id, declining_user)
            .await?;
        self.cache
            .invalidate_pair(&row.sender_id, &row.receiver_id)
            .await;
        Ok(row)
    }

    pub async fn remove_friend(&self, a: &str, b: &str) -> Result<bool> {
        let removed = self.friendships.remove_friendship(a, b).await? > 0;
        self.cache.invalidate_pair(a, b).await;
        Ok(removed)
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// Paginated friends list as summary shapes, cache-first. Only the first
    /// page is cached; deep pages are rare and cheap to compute.
    pub async fn friends_list(
        &self,
        user: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<serde_json::Value>, bool)> {
        let cacheable = offset == 0;
        if cacheable {
            if let Some(cached) = self.cache.friends_list(user).await {
                let page: Vec<serde_json::Value> =
                    cached.into_iter().take(limit as usize).collect();
                return Ok((page, true));
            }
        }

        let ids = self.friendships.friend_ids(user, limit, offset).await?;
        let profiles = self.profiles.fetch_many(&ids).await?;
        let summaries: Vec<serde_json::Value> =
            profiles.iter().map(friend_summary).collect();
        if cacheable {
            self.cache.set_friends_list(user, &summaries).await;
        }
        Ok((summaries, false))
    }

    /// How many of `user`'s friends are currently online, cache-first with
    /// the short TTL.
    pub async fn online_friends_count(&self, user: &str) -> Result<i64> {
        if let Some(count) = self.cache.online_count(user).await {
            return Ok(count);
        }
        let ids = self.friendships.friend_ids(user, 1_000, 0).await?;
        let rows = self.friendships.batch_presence(&ids).await?;
        let mut count = 0;
        for row in &rows {
            // The eager presence key is fresher than the profile row.
            let online = match presence::cached_status(&self.kv, &row.id).await {
                Some(status) => status.is_online(),
                None => row.is_online,
            };
            if online {
                count += 1;
            }
        }
        self.cache.set_online_count(user, count).await;
        Ok(count)
    }

    pub async fn pending_requests(
        &self,
        user: &str,
        direction: PendingDirection,
    ) -> Result<(Vec<serde_json::Value>, bool)> {
        if let Some(cached) = self.cache.pending(user, direction).await {
            return Ok((cached, true));
        }
        let rows = match direction {
            PendingDirection::Received => self.friendships.pending_received(user).await?,
            PendingDirection::Sent => self.friendships.pending_sent(user).await?,
        };
        let values: Vec<serde_json::Value> = rows
            .iter()
            .map(|r| serde_json::to_value(r).unwrap_or_default())
            .collect();
        self.cache.set_pending(user, direction, &values).await;
        Ok((values, false))
    }

    pub async fn friendship_status(&self, user: &str, other: &str) -> Result<FriendshipStatus> {
        if user == other {
            return Ok(FriendshipStatus::SelfTarget);
        }
        if let Some(status) = self.cache.friendship_status(user, other).await {
            return Ok(status);
        }
        let status = self.friendships.friendship_status(user, other).await?;
        self.cache.set_friendship_status(user, other, status).await;
        Ok(status)
    }

    pub async fn mutual_friends(&self, a: &str, b: &str) -> Result<(Vec<String>, bool)> {
        if let Some(cached) = self.cache.mutual_friends(a, b).await {
            return Ok((cached, true));
        }
        let ids = self.friendships.mutual_friend_ids(a, b).await?;
        self.cache.set_mutual_friends(a, b, &ids).await;
        Ok((ids, false))
    }

    pub async fn suggestions(&self, user: &str, limit: i64) -> Result<Vec<serde_json::Value>> {
        let ranked = self.friendships.suggestions(user, limit).await?;
        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let profiles = self.profiles.fetch_many(&ids).await?;
        let out = ranked
            .into_iter()
            .filter_map(|(id, mutuals)| {
                profiles.iter().find(|p| p.id == id).map(|p| {
                    let mut summary = friend_summary(p);
                    summary["mutualFriends"] = serde_json::json!(mutuals);
                    summary
                })
            })
            .collect();
        Ok(out)
    }

    pub async fn stats(&self, user: &str) -> Result<FriendStats> {
        self.friendships.stats(user).await
    }

    /// Presence snapshot for ≤100 ids, preferring the eager KV key per user.
    pub async fn batch_status(&self, ids: &[String]) -> Result<Vec<PresenceRow>> {
        let mut rows = self.friendships.batch_presence(ids).await?;
        for row in &mut rows {
            if let Some(status) = presence::cached_status(&self.kv, &row.id).await {
                row.is_online = status.is_online();
            }
        }
        Ok(rows)
    }

    /// Invalidate the friends-list caches of everyone who lists `user` as a
    /// friend (rename/avatar propagation).
    pub async fn invalidate_listers_of(&self, user: &str) -> Result<usize> {
        let listers = self.profiles.listed_as_friend_by(user).await?;
        for lister in &listers {
            self.cache.invalidate_friends_list(lister).await;
        }
        debug!(user, count = listers.len(), "invalidated dependent friends lists");
        Ok(listers.len())
    }
}
