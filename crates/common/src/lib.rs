//! Shared types, error definitions, and utilities used across all tinchat crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromDetail, Result, TinchatError},
    types::{Badge, ChatType, FriendshipStatus, NameAnimation, UserStatus, now_ms},
};
