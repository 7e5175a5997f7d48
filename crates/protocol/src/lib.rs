//! Event-socket and REST protocol definitions.
//!
//! All socket communication uses JSON frames over WebSocket:
//! - `ClientFrame` — client → server `{event, data}` envelope
//! - `ServerFrame` — server → client `{event, data}` envelope
//!
//! Inbound payloads are validated against [`schema`] descriptors at the edge;
//! handler code only ever sees the typed structs in [`events`].

pub mod envelope;
pub mod events;
pub mod frames;
pub mod sanitize;
pub mod schema;

pub use {
    envelope::ApiEnvelope,
    events::{
        FindPartnerParams, LeaveChatParams, MessageOut, PartnerFound, PeerShape,
        SendMessageParams, StatusUpdateParams, TypingParams, WebrtcSignalParams,
    },
    frames::{ClientFrame, ServerFrame},
    schema::{EventSchema, FieldKind, FieldSpec, ValidationError},
};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 65_536; // 64 KB
pub const MAX_MESSAGE_CHARS: usize = 2_000;
pub const MAX_INTERESTS: usize = 10;
pub const MAX_INTEREST_CHARS: usize = 50;
pub const MAX_ROOM_ID_CHARS: usize = 200;
pub const MAX_USERNAME_CHARS: usize = 30;
pub const MAX_REQUEST_MESSAGE_CHARS: usize = 500;
pub const MIN_SEARCH_TERM_CHARS: usize = 2;
pub const MAX_SEARCH_LIMIT: i64 = 50;
pub const MAX_BATCH_STATUS_IDS: usize = 100;
pub const RATE_LIMIT_PER_MINUTE: u64 = 100;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const TYPING_MIRROR_TTL_SECS: u64 = 5;

/// Inbound socket event names.
pub mod inbound {
    pub const FIND_PARTNER: &str = "findPartner";
    pub const LEAVE_CHAT: &str = "leaveChat";
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const WEBRTC_SIGNAL: &str = "webrtcSignal";
    pub const TYPING_START: &str = "typing_start";
    pub const TYPING_STOP: &str = "typing_stop";
    pub const STATUS_UPDATE: &str = "statusUpdate";
}

/// Outbound socket event names.
pub mod outbound {
    pub const PARTNER_FOUND: &str = "partner-found";
    pub const PARTNER_LEFT: &str = "partner-left";
    pub const MESSAGE: &str = "message";
    pub const WEBRTC_SIGNAL: &str = "webrtcSignal";
    pub const TYPING_START: &str = "typing_start";
    pub const TYPING_STOP: &str = "typing_stop";
    pub const REPLACED: &str = "replaced";
    pub const ERROR: &str = "error";
}
