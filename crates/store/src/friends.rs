//! Friendships, friend requests and blocks.
//!
//! Friendships are rows keyed by `(user, friend)` stored in both directions;
//! the mutating operations maintain the pairing invariants (acceptance writes
//! both rows in one transaction, blocks kill pending requests both ways).

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    sqlx::PgPool,
    tinchat_common::types::FriendshipStatus,
    uuid::Uuid,
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FriendRequestRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockRow {
    pub blocker_id: String,
    pub blocked_id: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PresenceRow {
    pub id: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FriendStats {
    pub friends: i64,
    pub pending_received: i64,
    pub pending_sent: i64,
    pub blocked: i64,
}

#[derive(Clone)]
pub struct FriendshipStore {
    pool: PgPool,
}

impl FriendshipStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ── Requests ─────────────────────────────────────────────────────────

    /// Create a pending request. Refuses self-targets, existing friendships,
    /// duplicate pending requests, and blocked pairs (either direction).
    pub async fn send_request(
        &self,
        sender: &str,
        receiver: &str,
        message: Option<&str>,
    ) -> Result<FriendRequestRow> {
        if sender == receiver {
            return Err(Error::conflict("Cannot send a friend request to yourself"));
        }
        if self.is_blocked_either(sender, receiver).await? {
            return Err(Error::conflict("Cannot send friend request"));
        }
        if self.are_friends(sender, receiver).await? {
            return Err(Error::conflict("Already friends"));
        }
        if self.pending_between(sender, receiver).await?.is_some() {
            return Err(Error::conflict("Friend request already sent"));
        }
        // An incoming pending request from the other side should be accepted,
        // not doubled.
        if self.pending_between(receiver, sender).await?.is_some() {
            return Err(Error::conflict(
                "This user already sent you a friend request",
            ));
        }

        let row = sqlx::query_as::<_, FriendRequestRow>(
            r"
            INSERT INTO friend_requests (id, sender_id, receiver_id, message, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(sender)
        .bind(receiver)
        .bind(message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // Unique pending index raced with a concurrent duplicate.
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::conflict("Friend request already sent")
            },
            other => Error::Database(other),
        })?;
        Ok(row)
    }

    /// Accept a pending request addressed to `accepting_user`. Writes both
    /// friendship rows in one transaction so their timestamps are equal.
    pub async fn accept_request(
        &self,
        request_id: &str,
        accepting_user: &str,
    ) -> Result<FriendRequestRow> {
        let mut tx = self.pool.begin().await?;

        let request = sqlx::query_as::<_, FriendRequestRow>(
            r"
            UPDATE friend_requests
            SET status = 'accepted', updated_at = NOW()
            WHERE id = $1 AND receiver_id = $2 AND status = 'pending'
            RETURNING *
            ",
        )
        .bind(request_id)
        .bind(accepting_user)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::NotFound)?;

        sqlx::query(
            r"
            INSERT INTO friendships (user_id, friend_id, status, initiator, created_at, updated_at)
            VALUES ($1, $2, 'accepted', $1, NOW(), NOW()),
                   ($2, $1, 'accepted', $1, NOW(), NOW())
            ON CONFLICT (user_id, friend_id)
                DO UPDATE SET status = 'accepted', updated_at = NOW()
            ",
        )
        .bind(&request.sender_id)
        .bind(&request.receiver_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// Decline a pending request addressed to `declining_user`.
    pub async fn decline_request(
        &self,
        request_id: &str,
        declining_user: &str,
    ) -> Result<FriendRequestRow> {
        sqlx::query_as::<_, FriendRequestRow>(
            r"
            UPDATE friend_requests
            SET status = 'declined', updated_at = NOW()
            WHERE id = $1 AND receiver_id = $2 AND status = 'pending'
            RETURNING *
            ",
        )
        .bind(request_id)
        .bind(declining_user)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::NotFound)
    }

    pub async fn pending_received(&self, user: &str) -> Result<Vec<FriendRequestRow>> {
        let rows = sqlx::query_as::<_, FriendRequestRow>(
            r"
            SELECT * FROM friend_requests
            WHERE receiver_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn pending_sent(&self, user: &str) -> Result<Vec<FriendRequestRow>> {
        let rows = sqlx::query_as::<_, FriendRequestRow>(
            r"
            SELECT * FROM friend_requests
            WHERE sender_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn pending_between(&self, sender: &str, receiver: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r"
            SELECT id FROM friend_requests
            WHERE sender_id = $1 AND receiver_id = $2 AND status = 'pending'
            ",
        )
        .bind(sender)
        .bind(receiver)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    // ── Friendships ──────────────────────────────────────────────────────

    pub async fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            r"
            SELECT 1 FROM friendships
            WHERE user_id = $1 AND friend_id = $2 AND status = 'accepted'
            ",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Remove both directions of a friendship. Returns how many rows went
    /// away (0 when they were not friends).
    pub async fn remove_friendship(&self, a: &str, b: &str) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM friendships
            WHERE (user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1)
            ",
        )
        .bind(a)
        .bind(b)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Friend ids of `user`, newest friendship first, paginated.
    pub async fn friend_ids(&self, user: &str, limit: i64, offset: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r"
            SELECT friend_id FROM friendships
            WHERE user_id = $1 AND status = 'accepted'
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn mutual_friend_ids(&self, a: &str, b: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r"
            SELECT f1.friend_id
            FROM friendships f1
            JOIN friendships f2
              ON f1.friend_id = f2.friend_id
            WHERE f1.user_id = $1 AND f1.status = 'accepted'
              AND f2.user_id = $2 AND f2.status = 'accepted'
            ",
        )
        .bind(a)
        .bind(b)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Friends-of-friends who are not already friends (nor self, nor
    /// blocked), ranked by how many mutual connections vouch for them.
    pub async fn suggestions(&self, user: &str, limit: i64) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r"
            SELECT fof.friend_id, COUNT(*) AS mutuals
            FROM friendships f
            JOIN friendships fof
              ON fof.user_id = f.friend_id AND fof.status = 'accepted'
            WHERE f.user_id = $1 AND f.status = 'accepted'
              AND fof.friend_id <> $1
              AND NOT EXISTS (
                  SELECT 1 FROM friendships existing
                  WHERE existing.user_id = $1
                    AND existing.friend_id = fof.friend_id
                    AND existing.status = 'accepted'
              )
              AND NOT EXISTS (
                  SELECT 1 FROM blocked_users b
                  WHERE (b.blocker_id = $1 AND b.blocked_id = fof.friend_id)
                     OR (b.blocker_id = fof.friend_id AND b.blocked_id = $1)
              )
            GROUP BY fof.friend_id
            ORDER BY mutuals DESC
            LIMIT $2
            ",
        )
        .bind(user)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn stats(&self, user: &str) -> Result<FriendStats> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r"
            SELECT
              (SELECT COUNT(*) FROM friendships
                WHERE user_id = $1 AND status = 'accepted'),
              (SELECT COUNT(*) FROM friend_requests
                WHERE receiver_id = $1 AND status = 'pending'),
              (SELECT COUNT(*) FROM friend_requests
                WHERE sender_id = $1 AND status = 'pending'),
              (SELECT COUNT(*) FROM blocked_users WHERE blocker_id = $1)
            ",
        )
        .bind(user)
        .fetch_one(&self.pool)
        .await?;
        Ok(FriendStats {
            friends: row.0,
            pending_received: row.1,
            pending_sent: row.2,
            blocked: row.3,
        })
    }

    // ── Blocks ───────────────────────────────────────────────────────────

    /// Block a user: removes any friendship and kills pending requests in
    /// both directions, then records the block.
    pub async fn block(&self, blocker: &str, blocked: &str, reason: Option<&str>) -> Result<()> {
        if blocker == blocked {
            return Err(Error::conflict("Cannot block yourself"));
        }
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            DELETE FROM friendships
            WHERE (user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1)
            ",
        )
        .bind(blocker)
        .bind(blocked)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE friend_requests
            SET status = 'declined', updated_at = NOW()
            WHERE status = 'pending'
              AND ((sender_id = $1 AND receiver_id = $2)
                OR (sender_id = $2 AND receiver_id = $1))
            ",
        )
        .bind(blocker)
        .bind(blocked)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO blocked_users (blocker_id, blocked_id, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (blocker_id, blocked_id) DO NOTHING
            ",
        )
        .bind(blocker)
        .bind(blocked)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        if inserted.rows_affected() == 0 {
            return Err(Error::conflict("User already blocked"));
        }
        Ok(())
    }

    pub async fn unblock(&self, blocker: &str, blocked: &str) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM blocked_users WHERE blocker_id = $1 AND blocked_id = $2",
        )
        .bind(blocker)
        .bind(blocked)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::conflict("User is not blocked"));
        }
        Ok(())
    }

    pub async fn blocked_by_user(&self, blocker: &str) -> Result<Vec<BlockRow>> {
        let rows = sqlx::query_as::<_, BlockRow>(
            "SELECT * FROM blocked_users WHERE blocker_id = $1 ORDER BY created_at DESC",
        )
        .bind(blocker)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn is_blocked(&self, blocker: &str, blocked: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM blocked_users WHERE blocker_id = $1 AND blocked_id = $2",
        )
        .bind(blocker)
        .bind(blocked)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn is_blocked_either(&self, a: &str, b: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            r"
            SELECT 1 FROM blocked_users
            WHERE (blocker_id = $1 AND blocked_id = $2)
               OR (blocker_id = $2 AND blocked_id = $1)
            ",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    // ── Status ───────────────────────────────────────────────────────────

    /// Compute the relationship of `(user, other)` fresh from the store.
    /// Precedence: accepted friendship > outgoing pending > incoming pending
    /// > outgoing block > incoming block > none.
    pub async fn friendship_status(&self, user: &str, other: &str) -> Result<FriendshipStatus> {
        if user == other {
            return Ok(FriendshipStatus::SelfTarget);
        }
        if self.are_friends(user, other).await? {
            return Ok(FriendshipStatus::Friends);
        }
        if self.pending_between(user, other).await?.is_some() {
            return Ok(FriendshipStatus::PendingSent);
        }
        if self.pending_between(other, user).await?.is_some() {
            return Ok(FriendshipStatus::PendingReceived);
        }
        if self.is_blocked(user, other).await? {
            return Ok(FriendshipStatus::Blocked);
        }
        if self.is_blocked(other, user).await? {
            return Ok(FriendshipStatus::BlockedBy);
        }
        Ok(FriendshipStatus::None)
    }

    /// Presence snapshot for a batch of user ids (≤100 enforced at the edge).
    pub async fn batch_presence(&self, ids: &[String]) -> Result<Vec<PresenceRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, PresenceRow>(
            "SELECT id, is_online, last_seen FROM user_profiles WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
