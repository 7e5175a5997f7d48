//! Domain types shared between the matchmaker, session manager, caches and
//! the gateway.

use {
    chrono::Utc,
    serde::{Deserialize, Serialize},
};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ── Chat type ────────────────────────────────────────────────────────────────

/// Matchmaking is strictly within-type: a text seeker never pairs with a
/// video seeker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Text,
    Video,
}

impl ChatType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Video => "video",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── User status ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Online,
    Idle,
    Dnd,
    Offline,
}

impl UserStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
            Self::Offline => "offline",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "online" => Some(Self::Online),
            "idle" => Some(Self::Idle),
            "dnd" => Some(Self::Dnd),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Display name animation ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameAnimation {
    #[default]
    None,
    Rainbow,
    Gradient,
    Pulse,
    Glow,
}

impl NameAnimation {
    /// Animations that re-render continuously; profiles using one are treated
    /// as frequently updated for cache TTL purposes.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Self::None)
    }
}

// ── Badge ────────────────────────────────────────────────────────────────────

/// A profile badge. At most 10 per profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ── Friendship status ────────────────────────────────────────────────────────

/// The relationship between an ordered pair of users, as seen from the first
/// user's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    None,
    Friends,
    PendingSent,
    PendingReceived,
    Blocked,
    BlockedBy,
    #[serde(rename = "self")]
    SelfTarget,
}

impl FriendshipStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Friends => "friends",
            Self::PendingSent => "pending_sent",
            Self::PendingReceived => "pending_received",
            Self::Blocked => "blocked",
            Self::BlockedBy => "blocked_by",
            Self::SelfTarget => "self",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "friends" => Some(Self::Friends),
            "pending_sent" => Some(Self::PendingSent),
            "pending_received" => Some(Self::PendingReceived),
            "blocked" => Some(Self::Blocked),
            "blocked_by" => Some(Self::BlockedBy),
            "self" => Some(Self::SelfTarget),
            _ => None,
        }
    }

    /// The same relationship seen from the other side of the pair.
    #[must_use]
    pub fn inverted(&self) -> Self {
        match self {
            Self::PendingSent => Self::PendingReceived,
            Self::PendingReceived => Self::PendingSent,
            Self::Blocked => Self::BlockedBy,
            Self::BlockedBy => Self::Blocked,
            other => *other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_type_round_trips_through_str() {
        assert_eq!(ChatType::parse("text"), Some(ChatType::Text));
        assert_eq!(ChatType::parse("video"), Some(ChatType::Video));
        assert_eq!(ChatType::parse("voice"), None);
        assert_eq!(ChatType::Video.as_str(), "video");
    }

    #[test]
    fn status_online_flag() {
        assert!(UserStatus::Idle.is_online());
        assert!(UserStatus::Dnd.is_online());
        assert!(!UserStatus::Offline.is_online());
    }

    #[test]
    fn friendship_status_inversion_is_symmetric() {
        for s in [
            FriendshipStatus::None,
            FriendshipStatus::Friends,
            FriendshipStatus::PendingSent,
            FriendshipStatus::PendingReceived,
            FriendshipStatus::Blocked,
            FriendshipStatus::BlockedBy,
            FriendshipStatus::SelfTarget,
        ] {
            assert_eq!(s.inverted().inverted(), s);
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&FriendshipStatus::PendingReceived).unwrap();
        assert_eq!(s, "\"pending_received\"");
        let s = serde_json::to_string(&FriendshipStatus::SelfTarget).unwrap();
        assert_eq!(s, "\"self\"");
    }
}
