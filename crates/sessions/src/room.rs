//! Room records.

use {
    std::collections::HashSet,
    tinchat_common::{now_ms, types::ChatType},
    uuid::Uuid,
};

/// Exactly two sockets paired for one session. Created after the matchmaker
/// commits a pair; destroyed on the first leave or disconnect.
#[derive(Debug, Clone)]
pub struct Room {
    /// Server-generated opaque id. Inbound room ids from clients are treated
    /// as opaque strings and never parsed.
    pub id: String,
    pub chat_type: ChatType,
    pub members: [String; 2],
    pub auth_ids: [Option<String>; 2],
    pub created_at: i64,
    /// Interests both members shared at creation time.
    pub common_interests: Vec<String>,
    /// Members that have acknowledged readiness (video setup handshake).
    pub ready: HashSet<String>,
}

impl Room {
    #[must_use]
    pub fn create(
        chat_type: ChatType,
        members: [String; 2],
        auth_ids: [Option<String>; 2],
        common_interests: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_type,
            members,
            auth_ids,
            created_at: now_ms(),
            common_interests,
            ready: HashSet::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, socket_id: &str) -> bool {
        self.members.iter().any(|m| m == socket_id)
    }

    /// The other member's socket id.
    #[must_use]
    pub fn peer_of(&self, socket_id: &str) -> Option<&str> {
        match &self.members {
            [a, b] if a == socket_id => Some(b),
            [a, b] if b == socket_id => Some(a),
            _ => None,
        }
    }

    pub fn mark_ready(&mut self, socket_id: &str) -> bool {
        if self.contains(socket_id) {
            self.ready.insert(socket_id.to_string());
        }
        self.ready.len() == 2
    }
}
