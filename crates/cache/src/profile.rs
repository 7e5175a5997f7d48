//! Two-tier read-through/write-through cache for user profiles.
//!
//! Read path: in-process LRU → remote KV (1s budget) → system of record
//! (bounded retries). Fetched records are shaped before caching and only
//! mirrored remotely when the serialized form fits the size budget.
//!
//! Write path: system of record first, then the LRU entry is updated in
//! place (optimistic), then a KV invalidation fires 2 seconds later so
//! closely-spaced updates coalesce into one.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    tinchat_store::{ProfileStore, UserProfile},
    tracing::{debug, warn},
};

use crate::{entry::CacheEntry, kv::KvClient, lru::LruCache};

pub const LRU_CAPACITY: usize = 1_000;
/// Shaped records above this never enter the remote tier.
pub const MAX_REMOTE_BYTES: usize = 50 * 1024;
/// TTL for profiles flagged as frequently updated.
pub const HOT_TTL: Duration = Duration::from_secs(60);
/// TTL for everyone else.
pub const STANDARD_TTL: Duration = Duration::from_secs(300);
/// Reads finding less than this fraction of TTL remaining re-arm the entry.
pub const REFRESH_THRESHOLD: f64 = 0.2;
/// Delay before the remote invalidation after a write, so bursts coalesce.
pub const INVALIDATE_DELAY: Duration = Duration::from_secs(2);
/// A profile updated within this window counts as frequently updated.
const RECENT_UPDATE_HOURS: i64 = 24;

fn kv_key(id: &str) -> String {
    format!("profile:{id}")
}

pub struct ProfileCache {
    lru: Mutex<LruCache<String, CacheEntry<UserProfile>>>,
    kv: KvClient,
    store: Option<ProfileStore>,
    /// Ids with a delayed remote invalidation already scheduled.
    pending_invalidation: Arc<Mutex<HashSet<String>>>,
}

impl ProfileCache {
    fn lru(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry<UserProfile>>> {
        // A poisoned guard still holds consistent cache data; recover it.
        self.lru.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.pending_invalidation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    #[must_use]
    pub fn new(kv: KvClient, store: Option<ProfileStore>) -> Self {
        Self {
            lru: Mutex::new(LruCache::new(LRU_CAPACITY)),
            kv,
            store,
            pending_invalidation: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// A profile is frequently updated iff it is currently online and either
    /// animates its display name or was updated within the last 24h.
    #[must_use]
    pub fn is_frequently_updated(profile: &UserProfile) -> bool {
        if !profile.is_online {
            return false;
        }
        let recently_updated = chrono::Utc::now() - profile.updated_at
            < chrono::Duration::hours(RECENT_UPDATE_HOURS);
        profile.has_dynamic_animation() || recently_updated
    }

    fn ttl_for(profile: &UserProfile) -> Duration {
        if Self::is_frequently_updated(profile) {
            HOT_TTL
        } else {
            STANDARD_TTL
        }
    }

    // ── Read path ────────────────────────────────────────────────────────

    pub async fn read(&self, id: &str) -> Option<UserProfile> {
        // Tier 1: in-process.
        if let Some(profile) = self.read_local(id) {
            return Some(profile);
        }

        // Tier 2: remote KV, skipped entirely while unhealthy.
        if self.kv.is_connected() {
            if let Some(raw) = self.kv.get(&kv_key(id)).await {
                match CacheEntry::<UserProfile>::decode_fresh(&raw) {
                    Some(entry) => {
                        if entry.remaining_fraction() < REFRESH_THRESHOLD {
                            self.rearm_remote(&entry).await;
                        }
                        let profile = entry.value.clone();
                        self.lru().set(id.to_string(), entry);
                        return Some(profile);
                    },
                    None => {
                        // Stale schema or expired payload: evict.
                        self.kv.del(&kv_key(id)).await;
                    },
                }
            }
        }

        // Tier 3: system of record.
        let store = self.store.as_ref()?;
        let profile = match store.fetch(id).await {
            Ok(Some(profile)) => profile.shaped(),
            Ok(None) => return None,
            Err(e) => {
                warn!(id, error = %e, "profile fetch failed");
                return None;
            },
        };
        self.populate(profile.clone()).await;
        Some(profile)
    }

    fn read_local(&self, id: &str) -> Option<UserProfile> {
        let mut lru = self.lru();
        let entry = lru.get(&id.to_string())?;
        if entry.is_expired() {
            lru.delete(&id.to_string());
            return None;
        }
        Some(entry.value.clone())
    }

    /// Install a freshly fetched profile in both tiers.
    async fn populate(&self, profile: UserProfile) {
        let ttl = Self::ttl_for(&profile);
        let entry = CacheEntry::new(profile, ttl.as_secs());
        let id = entry.value.id.clone();

        let fits_remote = entry.value.serialized_size() <= MAX_REMOTE_BYTES;
        let encoded = if fits_remote { entry.encode() } else { None };

        self.lru().set(id.clone(), entry);

        if let Some(raw) = encoded {
            if self.kv.is_connected() {
                self.kv.set(&kv_key(&id), &raw, ttl).await;
            }
        } else if !fits_remote {
            debug!(id, "profile too large for remote tier, local only");
        }
    }

    /// Re-write a nearly expired remote entry with a full TTL.
    async fn rearm_remote(&self, entry: &CacheEntry<UserProfile>) {
        let ttl = Self::ttl_for(&entry.value);
        let fresh = CacheEntry::new(entry.value.clone(), ttl.as_secs());
        if let Some(raw) = fresh.encode() {
            self.kv.set(&kv_key(&entry.value.id), &raw, ttl).await;
        }
    }

    // ── Write path ───────────────────────────────────────────────────────

    /// Persist to the system of record, update the local entry in place, and
    /// schedule a coalesced remote invalidation. Returns the shaped profile
    /// as written.
    pub async fn write(&self, profile: UserProfile) -> tinchat_store::error::Result<UserProfile> {
        let profile = profile.shaped();
        if let Some(store) = &self.store {
            store.upsert(&profile).await?;
        }

        let ttl = Self::ttl_for(&profile);
        {
            let mut lru = self.lru();
            let id = profile.id.clone();
            let updated = lru.update_in_place(&id, |entry| {
                entry.value = profile.clone();
                entry.cached_at = tinchat_common::now_ms();
                entry.ttl_secs = ttl.as_secs();
            });
            if !updated {
                lru.set(id, CacheEntry::new(profile.clone(), ttl.as_secs()));
            }
        }

        self.schedule_remote_invalidation(&profile.id);
        Ok(profile)
    }

    fn schedule_remote_invalidation(&self, id: &str) {
        if !self.kv.is_connected() {
            return;
        }
        {
            let mut pending = self.pending();
            if !pending.insert(id.to_string()) {
                // A delayed invalidation is already in flight; it covers this
                // write too.
                return;
            }
        }
        let kv = self.kv.clone();
        let pending = Arc::clone(&self.pending_invalidation);
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(INVALIDATE_DELAY).await;
            pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
            kv.del(&kv_key(&id)).await;
        });
    }

    /// Drop a profile from both tiers immediately.
    pub async fn invalidate(&self, id: &str) {
        self.lru().delete(&id.to_string());
        self.kv.del(&kv_key(id)).await;
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// Periodic sweep of the local tier.
    pub fn sweep_local(&self, max_age: Duration) -> usize {
        self.lru().sweep_older_than(max_age)
    }

    #[must_use]
    pub fn local_len(&self) -> usize {
        self.lru().len()
    }

    #[must_use]
    pub fn local_hit_rate(&self) -> f64 {
        self.lru().hit_rate()
    }

    pub fn clear_local(&self) {
        self.lru().clear();
    }

    /// Pre-load a batch of profiles (startup warmup).
    pub async fn warm(&self, profiles: Vec<UserProfile>) {
        for profile in profiles {
            self.populate(profile.shaped()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::Utc, sqlx::types::Json};

    fn profile(id: &str, online: bool, animation: &str) -> UserProfile {
        let now = Utc::now();
        UserProfile {
            id: id.into(),
            username: format!("user_{id}"),
            display_name: Some("Name".into()),
            avatar_url: None,
            banner_url: None,
            pronouns: None,
            bio: None,
            display_name_color: None,
            display_name_animation: animation.into(),
            rainbow_speed: 3,
            badges: Json(Vec::new()),
            profile_card_css: None,
            customization: Json(serde_json::json!({})),
            blocked_users: Json(Vec::new()),
            status: if online { "online" } else { "offline" }.into(),
            is_online: online,
            last_seen: now,
            created_at: now - chrono::Duration::days(30),
            updated_at: now - chrono::Duration::days(7),
        }
    }

    fn cache() -> ProfileCache {
        ProfileCache::new(KvClient::disabled(), None)
    }

    #[tokio::test]
    async fn write_then_read_hits_local_tier() {
        let cache = cache();
        let written = cache.write(profile("u1", false, "none")).await.unwrap();
        let read = cache.read("u1").await.unwrap();
        assert_eq!(read.id, written.id);
        assert_eq!(read.username, "user_u1");
    }

    #[tokio::test]
    async fn miss_without_any_backing_tier() {
        let cache = cache();
        assert!(cache.read("missing").await.is_none());
    }

    #[test]
    fn hot_ttl_requires_online() {
        let offline_animated = profile("a", false, "rainbow");
        assert!(!ProfileCache::is_frequently_updated(&offline_animated));

        let online_animated = profile("b", true, "rainbow");
        assert!(ProfileCache::is_frequently_updated(&online_animated));

        // Online, static animation, last updated a week ago: standard TTL.
        let online_stale = profile("c", true, "none");
        assert!(!ProfileCache::is_frequently_updated(&online_stale));

        // Online and updated within 24h: hot even without animation.
        let mut online_fresh = profile("d", true, "none");
        online_fresh.updated_at = Utc::now() - chrono::Duration::hours(1);
        assert!(ProfileCache::is_frequently_updated(&online_fresh));
    }

    #[tokio::test]
    async fn invalidate_clears_local_tier() {
        let cache = cache();
        cache.write(profile("u2", false, "none")).await.unwrap();
        cache.invalidate("u2").await;
        assert!(cache.read("u2").await.is_none());
    }

    #[tokio::test]
    async fn sweep_local_drops_aged_entries() {
        let cache = cache();
        cache.write(profile("u3", false, "none")).await.unwrap();
        assert_eq!(cache.local_len(), 1);
        assert_eq!(cache.sweep_local(Duration::ZERO), 1);
        assert_eq!(cache.local_len(), 0);
    }
}
