use serde::{Deserialize, Serialize};

/// Client → server envelope. `data` stays opaque until the event's schema has
/// accepted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Server → client envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFrame {
    pub event: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null", default)]
    pub data: serde_json::Value,
}

impl ServerFrame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Validation or transport failure, reported on the same event channel the
    /// client used.
    pub fn failure(event: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: serde_json::json!({ "success": false, "error": error.into() }),
        }
    }

    /// Serialize to the wire string. Falls back to a bare error frame if the
    /// payload cannot be serialized (programmer error).
    #[must_use]
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            "{\"event\":\"error\",\"data\":{\"success\":false,\"error\":\"internal error\"}}"
                .to_string()
        })
    }
}
