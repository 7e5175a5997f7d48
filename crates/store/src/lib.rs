//! System-of-record access.
//!
//! Everything durable (profiles, friendships, requests, blocks, messages)
//! lives in the external relational store; this crate owns the pooled
//! connection, the per-table repositories, and the bounded-retry policy for
//! transport failures.

pub mod error;
pub mod friends;
pub mod messages;
pub mod profile;
pub mod retry;

use {sqlx::postgres::PgPoolOptions, std::time::Duration, tracing::info};

use crate::error::Describe;

pub use {
    error::{Error, Result},
    friends::{BlockRow, FriendRequestRow, FriendshipStore, FriendStats, PresenceRow},
    messages::MessageStore,
    profile::{ProfileStore, UserProfile},
};

/// Per-attempt statement budget. Retries are handled above this timeout by
/// [`retry::with_retries`].
pub const STATEMENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect the pool and run migrations.
pub async fn connect(url: &str, max_connections: u32) -> Result<sqlx::PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(STATEMENT_TIMEOUT)
        .connect(url)
        .await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .describe("run schema migrations")?;
    info!(max_connections, "system of record connected");
    Ok(pool)
}
