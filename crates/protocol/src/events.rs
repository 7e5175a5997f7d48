//! Typed inbound/outbound event payloads.
//!
//! Inbound structs are only deserialized after their [`crate::schema`]
//! descriptor accepted the raw payload, so handler code can rely on the
//! bounds documented here.

use {
    serde::{Deserialize, Serialize},
    tinchat_common::types::{Badge, ChatType, UserStatus},
};

// ── Inbound ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FindPartnerParams {
    #[serde(rename = "chatType")]
    pub chat_type: ChatType,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(rename = "authId", default)]
    pub auth_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaveChatParams {
    #[serde(rename = "roomId")]
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageParams {
    #[serde(rename = "roomId", default)]
    pub room_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "authId", default)]
    pub auth_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebrtcSignalParams {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "signalData")]
    pub signal_data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypingParams {
    #[serde(rename = "roomId", default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateParams {
    pub status: UserStatus,
}

// ── Outbound ─────────────────────────────────────────────────────────────────

/// The display shape of a peer, sent with `partner-found` and snapshotted on
/// every relayed message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerShape {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "displayNameColor", skip_serializing_if = "Option::is_none")]
    pub display_name_color: Option<String>,
    #[serde(rename = "displayNameAnimation", skip_serializing_if = "Option::is_none")]
    pub display_name_animation: Option<String>,
    #[serde(rename = "rainbowSpeed", skip_serializing_if = "Option::is_none")]
    pub rainbow_speed: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pronouns: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub badges: Vec<Badge>,
    #[serde(rename = "avatarUrl", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(rename = "authId", skip_serializing_if = "Option::is_none")]
    pub auth_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerFound {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "chatType")]
    pub chat_type: ChatType,
    pub peer: PeerShape,
    #[serde(rename = "peerInterests")]
    pub peer_interests: Vec<String>,
    #[serde(rename = "commonInterests")]
    pub common_interests: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageOut {
    pub id: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub message: String,
    pub sender: PeerShape,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn find_partner_deserializes_with_defaults() {
        let params: FindPartnerParams =
            serde_json::from_value(json!({"chatType": "video"})).unwrap();
        assert_eq!(params.chat_type, ChatType::Video);
        assert!(params.interests.is_empty());
        assert!(params.auth_id.is_none());
    }

    #[test]
    fn peer_shape_omits_empty_fields() {
        let shape = PeerShape::default();
        let v = serde_json::to_value(&shape).unwrap();
        assert_eq!(v, json!({}));
    }

    #[test]
    fn message_out_wire_names() {
        let out = MessageOut {
            id: "m1".into(),
            room_id: "r1".into(),
            message: "hi".into(),
            sender: PeerShape::default(),
            timestamp: 1_700_000_000_000,
        };
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["roomId"], "r1");
        assert!(v.get("room_id").is_none());
    }
}
