//! Session-scoped user state.

use {
    tinchat_common::{
        now_ms,
        types::{Badge, ChatType, UserStatus},
    },
    tinchat_protocol::events::PeerShape,
};

/// One connected socket. Created on socket open, destroyed on close; the
/// gateway attaches identity after verification and the matchmaker stamps
/// the chat type on `findPartner`.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub socket_id: String,
    pub auth_id: Option<String>,
    pub chat_type: Option<ChatType>,
    pub interests: Vec<String>,
    /// Epoch ms when the socket connected.
    pub connection_start: i64,
    pub status: UserStatus,
    // Display shape, filled from the profile cache for authenticated users.
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub display_name_color: Option<String>,
    pub display_name_animation: Option<String>,
    pub rainbow_speed: Option<u8>,
    pub pronouns: Option<String>,
    pub avatar_url: Option<String>,
    pub badges: Vec<Badge>,
}

impl SessionUser {
    #[must_use]
    pub fn new(socket_id: impl Into<String>) -> Self {
        Self {
            socket_id: socket_id.into(),
            auth_id: None,
            chat_type: None,
            interests: Vec::new(),
            connection_start: now_ms(),
            status: UserStatus::Online,
            username: None,
            display_name: None,
            display_name_color: None,
            display_name_animation: None,
            rainbow_speed: None,
            pronouns: None,
            avatar_url: None,
            badges: Vec::new(),
        }
    }

    /// The display shape peers see: on `partner-found` and snapshotted onto
    /// every relayed message.
    #[must_use]
    pub fn peer_shape(&self) -> PeerShape {
        PeerShape {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            display_name_color: self.display_name_color.clone(),
            display_name_animation: self.display_name_animation.clone(),
            rainbow_speed: self.rainbow_speed,
            pronouns: self.pronouns.clone(),
            badges: self.badges.clone(),
            avatar_url: self.avatar_url.clone(),
            auth_id: self.auth_id.clone(),
        }
    }

    #[must_use]
    pub fn has_avatar(&self) -> bool {
        self.avatar_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_user_is_anonymous_and_online() {
        let user = SessionUser::new("s1");
        assert!(user.auth_id.is_none());
        assert_eq!(user.status, UserStatus::Online);
        assert!(user.chat_type.is_none());
        assert!(user.connection_start > 0);
    }

    #[test]
    fn peer_shape_carries_auth_id() {
        let mut user = SessionUser::new("s1");
        user.auth_id = Some("u1".into());
        user.display_name = Some("Ada".into());
        let shape = user.peer_shape();
        assert_eq!(shape.auth_id.as_deref(), Some("u1"));
        assert_eq!(shape.display_name.as_deref(), Some("Ada"));
    }
}
