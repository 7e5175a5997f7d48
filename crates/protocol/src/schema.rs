//! Typed schema descriptors for inbound socket payloads.
//!
//! A schema is plain data (field list + per-field constraints), so the same
//! descriptor drives the edge validator, the protocol documentation, and test
//! payload generation. Validation happens before any handler runs; a failure
//! never mutates server state.

use crate::{
    MAX_INTEREST_CHARS, MAX_INTERESTS, MAX_MESSAGE_CHARS, MAX_ROOM_ID_CHARS, MAX_USERNAME_CHARS,
};

// ── Descriptor types ─────────────────────────────────────────────────────────

/// Per-field constraint.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// UTF-8 string with char-count bounds. `charset` restricts every char
    /// when present.
    Str {
        min: usize,
        max: usize,
        charset: Option<Charset>,
    },
    /// Array of strings, bounded in length and per-item chars.
    StrList {
        max_items: usize,
        each_max: usize,
        charset: Option<Charset>,
    },
    /// One of a fixed vocabulary.
    Enum(&'static [&'static str]),
    /// Any JSON value, passed through opaque (WebRTC signal data).
    Any,
}

#[derive(Debug, Clone, Copy)]
pub enum Charset {
    /// ASCII letters, digits, space, `-`, `_`.
    Interest,
}

impl Charset {
    fn permits(self, c: char) -> bool {
        match self {
            Self::Interest => c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    /// Whether an explicit JSON `null` counts as absent.
    pub nullable: bool,
    pub kind: FieldKind,
}

#[derive(Debug, Clone)]
pub struct EventSchema {
    pub event: &'static str,
    pub fields: &'static [FieldSpec],
}

/// `<field>: <reason>`, the wire shape of a validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

// ── Event schemas ────────────────────────────────────────────────────────────

/// Vocabulary shared with [`tinchat_common::types::ChatType`].
pub const CHAT_TYPES: &[&str] = &["text", "video"];
/// Vocabulary shared with [`tinchat_common::types::UserStatus`].
pub const STATUSES: &[&str] = &["online", "idle", "dnd", "offline"];

static FIND_PARTNER_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "chatType",
        required: true,
        nullable: false,
        kind: FieldKind::Enum(&["text", "video"]),
    },
    FieldSpec {
        name: "interests",
        required: false,
        nullable: true,
        kind: FieldKind::StrList {
            max_items: MAX_INTERESTS,
            each_max: MAX_INTEREST_CHARS,
            charset: Some(Charset::Interest),
        },
    },
    FieldSpec {
        name: "authId",
        required: false,
        nullable: true,
        kind: FieldKind::Str {
            min: 1,
            max: 128,
            charset: None,
        },
    },
];

static LEAVE_CHAT_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "roomId",
    required: true,
    nullable: false,
    kind: FieldKind::Str {
        min: 1,
        max: MAX_ROOM_ID_CHARS,
        charset: None,
    },
}];

static SEND_MESSAGE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "roomId",
        required: false,
        nullable: true,
        kind: FieldKind::Str {
            min: 1,
            max: MAX_ROOM_ID_CHARS,
            charset: None,
        },
    },
    FieldSpec {
        name: "message",
        required: true,
        nullable: false,
        kind: FieldKind::Str {
            min: 1,
            max: MAX_MESSAGE_CHARS,
            charset: None,
        },
    },
    FieldSpec {
        name: "username",
        required: false,
        nullable: true,
        kind: FieldKind::Str {
            min: 1,
            max: MAX_USERNAME_CHARS,
            charset: None,
        },
    },
    FieldSpec {
        name: "authId",
        required: false,
        nullable: true,
        kind: FieldKind::Str {
            min: 1,
            max: 128,
            charset: None,
        },
    },
];

static WEBRTC_SIGNAL_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "roomId",
        required: true,
        nullable: false,
        kind: FieldKind::Str {
            min: 1,
            max: MAX_ROOM_ID_CHARS,
            charset: None,
        },
    },
    FieldSpec {
        name: "signalData",
        required: true,
        nullable: false,
        kind: FieldKind::Any,
    },
];

static TYPING_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "roomId",
    required: false,
    nullable: true,
    kind: FieldKind::Str {
        min: 1,
        max: MAX_ROOM_ID_CHARS,
        charset: None,
    },
}];

static STATUS_UPDATE_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "status",
    required: true,
    nullable: false,
    kind: FieldKind::Enum(&["online", "idle", "dnd", "offline"]),
}];

pub static FIND_PARTNER: EventSchema = EventSchema {
    event: crate::inbound::FIND_PARTNER,
    fields: FIND_PARTNER_FIELDS,
};
pub static LEAVE_CHAT: EventSchema = EventSchema {
    event: crate::inbound::LEAVE_CHAT,
    fields: LEAVE_CHAT_FIELDS,
};
pub static SEND_MESSAGE: EventSchema = EventSchema {
    event: crate::inbound::SEND_MESSAGE,
    fields: SEND_MESSAGE_FIELDS,
};
pub static WEBRTC_SIGNAL: EventSchema = EventSchema {
    event: crate::inbound::WEBRTC_SIGNAL,
    fields: WEBRTC_SIGNAL_FIELDS,
};
pub static TYPING: EventSchema = EventSchema {
    event: crate::inbound::TYPING_START,
    fields: TYPING_FIELDS,
};
pub static STATUS_UPDATE: EventSchema = EventSchema {
    event: crate::inbound::STATUS_UPDATE,
    fields: STATUS_UPDATE_FIELDS,
};

/// Look up the schema for an inbound event name.
#[must_use]
pub fn for_event(event: &str) -> Option<&'static EventSchema> {
    match event {
        crate::inbound::FIND_PARTNER => Some(&FIND_PARTNER),
        crate::inbound::LEAVE_CHAT => Some(&LEAVE_CHAT),
        crate::inbound::SEND_MESSAGE => Some(&SEND_MESSAGE),
        crate::inbound::WEBRTC_SIGNAL => Some(&WEBRTC_SIGNAL),
        crate::inbound::TYPING_START | crate::inbound::TYPING_STOP => Some(&TYPING),
        crate::inbound::STATUS_UPDATE => Some(&STATUS_UPDATE),
        _ => None,
    }
}

// ── Validator ────────────────────────────────────────────────────────────────

impl EventSchema {
    /// Validate a payload against this schema. Unknown fields are ignored;
    /// the typed deserialization downstream drops them anyway.
    pub fn validate(&self, payload: &serde_json::Value) -> Result<(), ValidationError> {
        let obj = match payload {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => {
                // An absent payload is fine iff nothing is required.
                if let Some(missing) = self.fields.iter().find(|f| f.required) {
                    return Err(ValidationError::new(missing.name, "is required"));
                }
                return Ok(());
            },
            _ => {
                return Err(ValidationError::new("payload", "must be an object"));
            },
        };

        for field in self.fields {
            match obj.get(field.name) {
                None => {
                    if field.required {
                        return Err(ValidationError::new(field.name, "is required"));
                    }
                },
                Some(serde_json::Value::Null) => {
                    // Explicit null is absent for nullable fields.
                    if field.required && !field.nullable {
                        return Err(ValidationError::new(field.name, "is required"));
                    }
                },
                Some(value) => check_field(field, value)?,
            }
        }
        Ok(())
    }
}

fn check_field(field: &FieldSpec, value: &serde_json::Value) -> Result<(), ValidationError> {
    match &field.kind {
        FieldKind::Any => Ok(()),
        FieldKind::Enum(vocab) => {
            let s = value
                .as_str()
                .ok_or_else(|| ValidationError::new(field.name, "must be a string"))?;
            if vocab.contains(&s) {
                Ok(())
            } else {
                Err(ValidationError::new(
                    field.name,
                    format!("must be one of {}", vocab.join("|")),
                ))
            }
        },
        FieldKind::Str { min, max, charset } => {
            let s = value
                .as_str()
                .ok_or_else(|| ValidationError::new(field.name, "must be a string"))?;
            check_str(field.name, s, *min, *max, *charset)
        },
        FieldKind::StrList {
            max_items,
            each_max,
            charset,
        } => {
            let items = value
                .as_array()
                .ok_or_else(|| ValidationError::new(field.name, "must be an array"))?;
            if items.len() > *max_items {
                return Err(ValidationError::new(
                    field.name,
                    format!("at most {max_items} entries"),
                ));
            }
            for item in items {
                let s = item.as_str().ok_or_else(|| {
                    ValidationError::new(field.name, "entries must be strings")
                })?;
                check_str(field.name, s, 1, *each_max, *charset)?;
            }
            Ok(())
        },
    }
}

fn check_str(
    name: &str,
    s: &str,
    min: usize,
    max: usize,
    charset: Option<Charset>,
) -> Result<(), ValidationError> {
    let chars = s.chars().count();
    if chars < min {
        return Err(ValidationError::new(name, format!("at least {min} characters")));
    }
    if chars > max {
        return Err(ValidationError::new(name, format!("at most {max} characters")));
    }
    if let Some(set) = charset {
        if let Some(bad) = s.chars().find(|c| !set.permits(*c)) {
            return Err(ValidationError::new(
                name,
                format!("character {bad:?} not allowed"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn find_partner_happy_path() {
        let payload = json!({"chatType": "text", "interests": ["music", "games"]});
        assert!(FIND_PARTNER.validate(&payload).is_ok());
    }

    #[test]
    fn find_partner_requires_chat_type() {
        let err = FIND_PARTNER.validate(&json!({"interests": []})).unwrap_err();
        assert_eq!(err.field, "chatType");
    }

    #[test]
    fn find_partner_rejects_unknown_chat_type() {
        let err = FIND_PARTNER
            .validate(&json!({"chatType": "voice"}))
            .unwrap_err();
        assert!(err.reason.contains("text|video"));
    }

    #[test]
    fn eleven_interests_rejected_ten_accepted() {
        let ten: Vec<String> = (0..10).map(|i| format!("topic{i}")).collect();
        let eleven: Vec<String> = (0..11).map(|i| format!("topic{i}")).collect();
        assert!(
            FIND_PARTNER
                .validate(&json!({"chatType": "text", "interests": ten}))
                .is_ok()
        );
        let err = FIND_PARTNER
            .validate(&json!({"chatType": "text", "interests": eleven}))
            .unwrap_err();
        assert_eq!(err.to_string(), "interests: at most 10 entries");
    }

    #[test]
    fn interest_charset_enforced() {
        let err = FIND_PARTNER
            .validate(&json!({"chatType": "text", "interests": ["mu$ic"]}))
            .unwrap_err();
        assert_eq!(err.field, "interests");
    }

    #[test]
    fn message_length_boundary() {
        let ok = "a".repeat(2000);
        let too_long = "a".repeat(2001);
        assert!(SEND_MESSAGE.validate(&json!({"message": ok})).is_ok());
        let err = SEND_MESSAGE
            .validate(&json!({"message": too_long}))
            .unwrap_err();
        assert_eq!(err.field, "message");
    }

    #[test]
    fn null_optional_fields_accepted() {
        let payload = json!({"message": "hi", "roomId": null, "username": null, "authId": null});
        assert!(SEND_MESSAGE.validate(&payload).is_ok());
    }

    #[test]
    fn typing_accepts_empty_payload() {
        assert!(TYPING.validate(&serde_json::Value::Null).is_ok());
        assert!(TYPING.validate(&json!({})).is_ok());
    }

    #[test]
    fn status_vocabulary() {
        assert!(STATUS_UPDATE.validate(&json!({"status": "dnd"})).is_ok());
        assert!(STATUS_UPDATE.validate(&json!({"status": "away"})).is_err());
    }

    #[test]
    fn webrtc_signal_passes_opaque_data() {
        let payload = json!({"roomId": "r1", "signalData": {"sdp": {"type": "offer"}}});
        assert!(WEBRTC_SIGNAL.validate(&payload).is_ok());
    }

    #[test]
    fn room_id_permissive_up_to_200() {
        let ok = json!({"roomId": "x".repeat(200)});
        let too_long = json!({"roomId": "x".repeat(201)});
        assert!(LEAVE_CHAT.validate(&ok).is_ok());
        assert!(LEAVE_CHAT.validate(&too_long).is_err());
    }
}
