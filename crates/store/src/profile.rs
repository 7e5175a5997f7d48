//! Durable user profiles and the size-shaping rule applied on read.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    sqlx::{PgPool, types::Json},
    tinchat_common::types::{Badge, UserStatus},
    tracing::debug,
};

use crate::{
    error::Result,
    retry::with_retries,
};

/// A serialized profile larger than this is rewritten to a lightweight form
/// on read: inline base64 media stripped, style blob and bio truncated.
pub const MAX_PROFILE_BYTES: usize = 30 * 1024;
pub const MAX_BIO_CHARS: usize = 1_000;
pub const MAX_CARD_CSS_BYTES: usize = 10 * 1024;
pub const MAX_BADGES: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    pub pronouns: Option<String>,
    pub bio: Option<String>,
    pub display_name_color: Option<String>,
    pub display_name_animation: String,
    pub rainbow_speed: i16,
    pub badges: Json<Vec<Badge>>,
    pub profile_card_css: Option<String>,
    pub customization: Json<serde_json::Value>,
    pub blocked_users: Json<Vec<String>>,
    pub status: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    #[must_use]
    pub fn status_parsed(&self) -> UserStatus {
        UserStatus::parse(&self.status).unwrap_or(UserStatus::Offline)
    }

    /// Whether the display name uses a continuously re-rendering animation.
    #[must_use]
    pub fn has_dynamic_animation(&self) -> bool {
        self.display_name_animation != "none"
    }

    #[must_use]
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// Apply the ingest shaping rule. Always bounds bio, badge count and the
    /// style blob; when the record still exceeds [`MAX_PROFILE_BYTES`],
    /// inline base64 media is stripped too.
    #[must_use]
    pub fn shaped(mut self) -> Self {
        self.bio = self.bio.take().map(|bio| {
            if bio.chars().count() > MAX_BIO_CHARS {
                bio.chars().take(MAX_BIO_CHARS).collect()
            } else {
                bio
            }
        });
        self.profile_card_css = self.profile_card_css.take().map(|css| {
            if css.len() > MAX_CARD_CSS_BYTES {
                let mut end = MAX_CARD_CSS_BYTES;
                while !css.is_char_boundary(end) {
                    end -= 1;
                }
                css[..end].to_string()
            } else {
                css
            }
        });
        if self.badges.0.len() > MAX_BADGES {
            self.badges.0.truncate(MAX_BADGES);
        }

        if self.serialized_size() > MAX_PROFILE_BYTES {
            debug!(id = %self.id, "profile over size budget, demoting to lightweight form");
            self = self.lightweight();
        }
        self
    }

    /// Strip everything heavy: inline media, style blob, customization.
    #[must_use]
    pub fn lightweight(mut self) -> Self {
        if is_inline_media(self.avatar_url.as_deref()) {
            self.avatar_url = None;
        }
        if is_inline_media(self.banner_url.as_deref()) {
            self.banner_url = None;
        }
        self.profile_card_css = None;
        self.customization = Json(serde_json::Value::Object(serde_json::Map::new()));
        for badge in &mut self.badges.0 {
            if badge.url.starts_with("data:") {
                badge.url.clear();
            }
        }
        self
    }
}

fn is_inline_media(url: Option<&str>) -> bool {
    url.is_some_and(|u| u.starts_with("data:"))
}

// ── Store ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ProfileStore {
    pool: PgPool,
}

impl ProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a profile by stable id, with transport retries. The caller
    /// applies shaping.
    pub async fn fetch(&self, id: &str) -> Result<Option<UserProfile>> {
        with_retries("profile.fetch", || async {
            let row = sqlx::query_as::<_, UserProfile>(
                "SELECT * FROM user_profiles WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
        .await
    }

    pub async fn fetch_many(&self, ids: &[String]) -> Result<Vec<UserProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        with_retries("profile.fetch_many", || async {
            let rows = sqlx::query_as::<_, UserProfile>(
                "SELECT * FROM user_profiles WHERE id = ANY($1)",
            )
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    /// Insert or fully replace a profile row.
    pub async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO user_profiles (
                id, username, display_name, avatar_url, banner_url, pronouns, bio,
                display_name_color, display_name_animation, rainbow_speed, badges,
                profile_card_css, customization, blocked_users, status, is_online,
                last_seen, created_at, updated_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,NOW())
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                display_name = EXCLUDED.display_name,
                avatar_url = EXCLUDED.avatar_url,
                banner_url = EXCLUDED.banner_url,
                pronouns = EXCLUDED.pronouns,
                bio = EXCLUDED.bio,
                display_name_color = EXCLUDED.display_name_color,
                display_name_animation = EXCLUDED.display_name_animation,
                rainbow_speed = EXCLUDED.rainbow_speed,
                badges = EXCLUDED.badges,
                profile_card_css = EXCLUDED.profile_card_css,
                customization = EXCLUDED.customization,
                blocked_users = EXCLUDED.blocked_users,
                status = EXCLUDED.status,
                is_online = EXCLUDED.is_online,
                last_seen = EXCLUDED.last_seen,
                updated_at = NOW()
            ",
        )
        .bind(&profile.id)
        .bind(&profile.username)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .bind(&profile.banner_url)
        .bind(&profile.pronouns)
        .bind(&profile.bio)
        .bind(&profile.display_name_color)
        .bind(&profile.display_name_animation)
        .bind(profile.rainbow_speed)
        .bind(&profile.badges)
        .bind(&profile.profile_card_css)
        .bind(&profile.customization)
        .bind(&profile.blocked_users)
        .bind(&profile.status)
        .bind(profile.is_online)
        .bind(profile.last_seen)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// One grouped presence update: every queued user with the same target
    /// status lands in a single statement.
    pub async fn update_status_bulk(&self, status: UserStatus, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r"
            UPDATE user_profiles
            SET status = $1, is_online = $2, last_seen = NOW(), updated_at = NOW()
            WHERE id = ANY($3)
            ",
        )
        .bind(status.as_str())
        .bind(status.is_online())
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Housekeeping: everyone idle past the cutoff goes offline.
    pub async fn mark_stale_offline(&self, max_idle_minutes: i64) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE user_profiles
            SET status = 'offline', is_online = FALSE, updated_at = NOW()
            WHERE is_online = TRUE
              AND last_seen < NOW() - ($1 * interval '1 minute')
            ",
        )
        .bind(max_idle_minutes as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Username/display-name search, excluding the requester.
    pub async fn search(
        &self,
        term: &str,
        excluding: &str,
        limit: i64,
    ) -> Result<Vec<UserProfile>> {
        let pattern = format!("%{}%", term.replace('%', "\\%").replace('_', "\\_"));
        with_retries("profile.search", || async {
            let rows = sqlx::query_as::<_, UserProfile>(
                r"
                SELECT * FROM user_profiles
                WHERE id <> $2
                  AND (username ILIKE $1 OR display_name ILIKE $1)
                ORDER BY is_online DESC, last_seen DESC
                LIMIT $3
                ",
            )
            .bind(&pattern)
            .bind(excluding)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    /// Warmup query: currently-online profiles seen within the window.
    pub async fn online_recent(&self, window_hours: i64, limit: i64) -> Result<Vec<UserProfile>> {
        let rows = sqlx::query_as::<_, UserProfile>(
            r"
            SELECT * FROM user_profiles
            WHERE is_online = TRUE
              AND last_seen > NOW() - ($1 * interval '1 hour')
            ORDER BY last_seen DESC
            LIMIT $2
            ",
        )
        .bind(window_hours as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Liveness probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Users whose friends list mentions `id` (for rename invalidation).
    pub async fn listed_as_friend_by(&self, id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM friendships WHERE friend_id = $1 AND status = 'accepted'",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> UserProfile {
        let now = Utc::now();
        UserProfile {
            id: id.into(),
            username: format!("user_{id}"),
            display_name: None,
            avatar_url: None,
            banner_url: None,
            pronouns: None,
            bio: None,
            display_name_color: None,
            display_name_animation: "none".into(),
            rainbow_speed: 3,
            badges: Json(Vec::new()),
            profile_card_css: None,
            customization: Json(serde_json::json!({})),
            blocked_users: Json(Vec::new()),
            status: "offline".into(),
            is_online: false,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn shaping_truncates_bio_and_css() {
        let mut p = profile("u1");
        p.bio = Some("b".repeat(5_000));
        p.profile_card_css = Some("c".repeat(40_000));
        let shaped = p.shaped();
        assert_eq!(shaped.bio.unwrap().chars().count(), MAX_BIO_CHARS);
        assert_eq!(shaped.profile_card_css.unwrap().len(), MAX_CARD_CSS_BYTES);
    }

    #[test]
    fn oversized_profile_goes_lightweight() {
        let mut p = profile("u2");
        p.avatar_url = Some(format!("data:image/png;base64,{}", "A".repeat(40_000)));
        let shaped = p.shaped();
        assert!(shaped.avatar_url.is_none());
        assert!(shaped.serialized_size() <= MAX_PROFILE_BYTES);
    }

    #[test]
    fn remote_avatar_url_survives_lightweight() {
        let mut p = profile("u3");
        p.avatar_url = Some("https://cdn.example/avatar.png".into());
        p.bio = Some("short bio".into());
        let light = p.lightweight();
        assert_eq!(
            light.avatar_url.as_deref(),
            Some("https://cdn.example/avatar.png")
        );
        assert_eq!(light.bio.as_deref(), Some("short bio"));
    }

    #[test]
    fn dynamic_animation_detection() {
        let mut p = profile("u4");
        assert!(!p.has_dynamic_animation());
        p.display_name_animation = "rainbow".into();
        assert!(p.has_dynamic_animation());
    }
}
