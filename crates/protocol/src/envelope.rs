//! The REST response envelope shared by every `/api` handler.

use {
    serde::{Deserialize, Serialize},
    tinchat_common::now_ms,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(rename = "fetchTime", skip_serializing_if = "Option::is_none")]
    pub fetch_time: Option<u64>,
}

impl ApiEnvelope {
    #[must_use]
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            timestamp: now_ms(),
            cached: None,
            fetch_time: None,
        }
    }

    /// Success with cache provenance (`cached` + fetch duration in ms).
    #[must_use]
    pub fn ok_timed(data: serde_json::Value, cached: bool, fetch_time_ms: u64) -> Self {
        Self {
            cached: Some(cached),
            fetch_time: Some(fetch_time_ms),
            ..Self::ok(data)
        }
    }

    /// A structured non-success outcome (conflict, not-found). Distinct from
    /// `error`: the request was understood but refused.
    #[must_use]
    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: None,
            message: Some(message.into()),
            timestamp: now_ms(),
            cached: None,
            fetch_time: None,
        }
    }

    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
            timestamp: now_ms(),
            cached: None,
            fetch_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_omits_error_fields() {
        let v = serde_json::to_value(ApiEnvelope::ok(serde_json::json!({"n": 1}))).unwrap();
        assert_eq!(v["success"], true);
        assert!(v.get("error").is_none());
        assert!(v.get("message").is_none());
        assert!(v["timestamp"].is_i64());
    }

    #[test]
    fn timed_envelope_carries_provenance() {
        let v =
            serde_json::to_value(ApiEnvelope::ok_timed(serde_json::json!([]), true, 12)).unwrap();
        assert_eq!(v["cached"], true);
        assert_eq!(v["fetchTime"], 12);
    }

    #[test]
    fn refused_vs_error() {
        let refused = serde_json::to_value(ApiEnvelope::refused("Friend request already sent"))
            .unwrap();
        assert_eq!(refused["success"], false);
        assert_eq!(refused["message"], "Friend request already sent");
        assert!(refused.get("error").is_none());

        let error = serde_json::to_value(ApiEnvelope::error("internal error")).unwrap();
        assert_eq!(error["error"], "internal error");
    }
}
