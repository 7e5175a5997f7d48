//! Profile orchestration.
//!
//! [`ProfileManager`] composes the two-tier profile cache, the presence
//! batcher, and the friends/search/blocking services as plain struct fields
//! (no dynamic dispatch), and owns startup warmup and graceful shutdown.

pub mod blocking;
pub mod friends;
pub mod manager;
pub mod search;

pub use {
    blocking::BlockingService,
    friends::{FriendsService, friend_summary},
    manager::ProfileManager,
    search::SearchService,
};
