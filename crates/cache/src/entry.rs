//! Version-tagged cache envelope shared by both tiers.

use {
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    tinchat_common::now_ms,
};

/// Bumped whenever the cached shape changes; readers treat a mismatch as a
/// miss and evict the entry.
pub const CACHE_SCHEMA_VERSION: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Epoch ms at write time.
    pub cached_at: i64,
    /// Seconds this entry stays fresh.
    pub ttl_secs: u64,
    pub version: u32,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl_secs: u64) -> Self {
        Self {
            value,
            cached_at: now_ms(),
            ttl_secs,
            version: CACHE_SCHEMA_VERSION,
        }
    }

    #[must_use]
    pub fn age_ms(&self) -> i64 {
        (now_ms() - self.cached_at).max(0)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.age_ms() as u64 >= self.ttl_secs * 1_000
    }

    /// Fraction of the TTL still remaining, in `[0, 1]`.
    #[must_use]
    pub fn remaining_fraction(&self) -> f64 {
        if self.ttl_secs == 0 {
            return 0.0;
        }
        let total = (self.ttl_secs * 1_000) as f64;
        ((total - self.age_ms() as f64) / total).clamp(0.0, 1.0)
    }
}

impl<T: Serialize> CacheEntry<T> {
    pub fn encode(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    /// Decode an entry, rejecting wrong versions and expired payloads.
    #[must_use]
    pub fn decode_fresh(raw: &str) -> Option<Self> {
        let entry: Self = serde_json::from_str(raw).ok()?;
        if entry.version != CACHE_SCHEMA_VERSION || entry.is_expired() {
            return None;
        }
        Some(entry)
    }
}
