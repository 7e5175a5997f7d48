//! Two-tier cache coherence layer.
//!
//! An in-process LRU sits in front of the remote key-value store, which sits
//! in front of the system of record. Entries are version-tagged and carry
//! their own TTL; a version mismatch is a miss and evicts. When the remote
//! tier is down the layer fails open to the system of record.

pub mod entry;
pub mod friends;
pub mod kv;
pub mod lru;
pub mod presence;
pub mod profile;

pub use {
    entry::{CACHE_SCHEMA_VERSION, CacheEntry},
    friends::FriendsCache,
    kv::KvClient,
    lru::LruCache,
    presence::{PresenceBatcher, PresenceHandle},
    profile::ProfileCache,
};
