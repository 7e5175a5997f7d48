//! The profile manager: composition root for profile data.

use std::sync::Arc;

use {
    tinchat_cache::{FriendsCache, KvClient, PresenceBatcher, PresenceHandle, ProfileCache},
    tinchat_store::{FriendshipStore, MessageStore, ProfileStore, UserProfile, error::Result},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{blocking::BlockingService, friends::FriendsService, search::SearchService};

/// Warmup scope: currently-online profiles seen within this window.
const WARMUP_WINDOW_HOURS: i64 = 24;
const WARMUP_LIMIT: i64 = 50;

/// Composed profile subsystem. Each submodule is a concrete struct field;
/// the only shared seam is the KV client.
pub struct ProfileManager {
    pub profiles: Arc<ProfileCache>,
    /// `None` without a system of record; the gateway turns the friends
    /// routes off in that mode.
    pub friends: Option<FriendsService>,
    pub search: Option<SearchService>,
    pub blocking: Option<BlockingService>,
    pub presence: PresenceHandle,
    pub messages: Option<MessageStore>,
    store: Option<ProfileStore>,
    kv: KvClient,
    cancel: CancellationToken,
    presence_task: tokio::task::JoinHandle<()>,
}

impl ProfileManager {
    /// Wire the subsystem. `pool` being `None` disables every durable
    /// feature while leaving the caches and presence keys functional.
    #[must_use]
    pub fn new(pool: Option<sqlx::PgPool>, kv: KvClient, cancel: CancellationToken) -> Self {
        let profile_store = pool.clone().map(ProfileStore::new);
        let friendship_store = pool.clone().map(FriendshipStore::new);
        let message_store = pool.map(MessageStore::new);

        let profiles = Arc::new(ProfileCache::new(kv.clone(), profile_store.clone()));
        let friends_cache = FriendsCache::new(kv.clone());
        let (presence, presence_task) =
            PresenceBatcher::spawn(profile_store.clone(), kv.clone());

        let (friends, search, blocking) = match (&profile_store, &friendship_store) {
            (Some(p), Some(f)) => (
                Some(FriendsService::new(
                    f.clone(),
                    p.clone(),
                    friends_cache.clone(),
                    kv.clone(),
                )),
                Some(SearchService::new(p.clone(), f.clone())),
                Some(BlockingService::new(f.clone(), friends_cache)),
            ),
            _ => (None, None, None),
        };

        Self {
            profiles,
            friends,
            search,
            blocking,
            presence,
            messages: message_store,
            store: profile_store,
            kv,
            cancel,
            presence_task,
        }
    }

    #[must_use]
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Liveness of the system of record; `false` when unconfigured.
    pub async fn ping_store(&self) -> bool {
        match &self.store {
            Some(store) => store.ping().await,
            None => false,
        }
    }

    #[must_use]
    pub fn kv(&self) -> &KvClient {
        &self.kv
    }

    // ── Profile reads/writes ─────────────────────────────────────────────

    pub async fn read_profile(&self, id: &str) -> Option<UserProfile> {
        self.profiles.read(id).await
    }

    /// Write a profile through the cache. When the display name or avatar
    /// changed, friends-list caches of everyone listing this user are
    /// invalidated so the rename propagates within one TTL window.
    pub async fn write_profile(&self, profile: UserProfile) -> Result<UserProfile> {
        let before = self.profiles.read(&profile.id).await;
        let written = self.profiles.write(profile).await?;

        let display_changed = before.as_ref().is_none_or(|old| {
            old.display_name != written.display_name || old.avatar_url != written.avatar_url
        });
        if display_changed {
            if let Some(friends) = &self.friends {
                if let Err(e) = friends.invalidate_listers_of(&written.id).await {
                    warn!(error = %e, "dependent friends-list invalidation failed");
                }
            }
        }
        Ok(written)
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Pre-load recently active online profiles into the cache.
    pub async fn warm_cache(&self) {
        let Some(store) = &self.store else { return };
        match store.online_recent(WARMUP_WINDOW_HOURS, WARMUP_LIMIT).await {
            Ok(profiles) => {
                let count = profiles.len();
                self.profiles.warm(profiles).await;
                info!(count, "profile cache warmed");
            },
            Err(e) => warn!(error = %e, "profile cache warmup failed"),
        }
    }

    /// Housekeeping entry points driven by the gateway's tickers.
    pub fn sweep_profile_cache(&self, max_age: std::time::Duration) -> usize {
        self.profiles.sweep_local(max_age)
    }

    pub async fn housekeeping(&self) {
        if let Some(store) = &self.store {
            match store.mark_stale_offline(tinchat_cache::presence::OFFLINE_AFTER_MINUTES).await {
                Ok(0) => {},
                Ok(n) => info!(n, "marked stale users offline"),
                Err(e) => warn!(error = %e, "stale-offline sweep failed"),
            }
        }
        if let Some(messages) = &self.messages {
            match messages.purge_expired().await {
                Ok(0) => {},
                Ok(n) => info!(n, "purged expired messages"),
                Err(e) => warn!(error = %e, "message retention purge failed"),
            }
        }
    }

    /// Graceful shutdown: stop tickers, drain the presence queue offline in
    /// one batch, clear the in-process cache. The KV connection manager
    /// closes when its last clone drops. The presence acknowledgement only
    /// arrives after the final flush, so durable state is settled when this
    /// returns.
    pub async fn shutdown(&self) {
        info!("profile manager shutting down");
        self.cancel.cancel();
        self.presence.shutdown().await;
        if self.presence_task.is_finished() {
            info!("presence batcher drained");
        }
        self.profiles.clear_local();
        info!("profile manager shut down");
    }
}
