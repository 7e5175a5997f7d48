//! Queue entries.

use {
    serde::{Deserialize, Serialize},
    tinchat_common::types::ChatType,
};

/// Default cap on how long a candidate may have been waiting before the
/// seeker's preference excludes them.
pub const DEFAULT_MAX_WAIT_MS: i64 = 5 * 60 * 1_000;

/// A user waiting in a matchmaking queue. Snapshotted from the session at
/// enqueue time; also the shape mirrored into the KV queue lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedUser {
    pub socket_id: String,
    #[serde(default)]
    pub auth_id: Option<String>,
    pub chat_type: ChatType,
    #[serde(default)]
    pub interests: Vec<String>,
    /// Epoch ms when the socket connected; the filter's connection-age rules
    /// key off this.
    pub connection_start: i64,
    /// Epoch ms when the entry joined the queue.
    pub enqueued_at: i64,
    // Profile-completeness inputs for scoring.
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub has_avatar: bool,
    #[serde(default)]
    pub pronouns: Option<String>,
    #[serde(default)]
    pub badge_count: usize,
    // Matchmaking preferences.
    #[serde(default)]
    pub avoid_recent_matches: bool,
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: i64,
}

fn default_max_wait() -> i64 {
    DEFAULT_MAX_WAIT_MS
}

impl QueuedUser {
    /// A minimal anonymous entry; the builders below layer on identity and
    /// profile data.
    #[must_use]
    pub fn new(socket_id: impl Into<String>, chat_type: ChatType) -> Self {
        Self {
            socket_id: socket_id.into(),
            auth_id: None,
            chat_type,
            interests: Vec::new(),
            connection_start: 0,
            enqueued_at: 0,
            display_name: None,
            has_avatar: false,
            pronouns: None,
            badge_count: 0,
            avoid_recent_matches: false,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth_id: impl Into<String>) -> Self {
        self.auth_id = Some(auth_id.into());
        self
    }

    #[must_use]
    pub fn with_interests(mut self, interests: Vec<String>) -> Self {
        self.interests = interests;
        self
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth_id.is_some()
    }

    /// Session history is keyed by the stable id when present, else the
    /// socket id.
    #[must_use]
    pub fn history_key(&self) -> &str {
        self.auth_id.as_deref().unwrap_or(&self.socket_id)
    }

    /// How long this entry has existed as a connection.
    #[must_use]
    pub fn connection_age_ms(&self, now: i64) -> i64 {
        (now - self.connection_start).max(0)
    }

    #[must_use]
    pub fn wait_ms(&self, now: i64) -> i64 {
        (now - self.enqueued_at).max(0)
    }

    /// Profile completeness in `[0, 1]` from the fixed checklist:
    /// display name 0.2, avatar 0.2, pronouns 0.1, badges 0.2,
    /// authenticated 0.3.
    #[must_use]
    pub fn profile_completeness(&self) -> f64 {
        let mut score = 0.0;
        if self.display_name.as_deref().is_some_and(|n| !n.is_empty()) {
            score += 0.2;
        }
        if self.has_avatar {
            score += 0.2;
        }
        if self.pronouns.as_deref().is_some_and(|p| !p.is_empty()) {
            score += 0.1;
        }
        if self.badge_count > 0 {
            score += 0.2;
        }
        if self.is_authenticated() {
            score += 0.3;
        }
        score
    }
}
