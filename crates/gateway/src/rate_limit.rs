//! Per-address rate limiting over KV counters.
//!
//! 100 requests per minute, computed as a weighted two-bucket sliding window
//! (previous minute's count decays linearly as the current minute elapses).
//! KV trouble fails open: a limiter that cannot count must not deny.

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use {
    axum::{
        extract::{ConnectInfo, State},
        http::StatusCode,
        middleware::Next,
        response::{IntoResponse, Json, Response},
    },
    tinchat_cache::KvClient,
    tinchat_common::now_ms,
    tinchat_protocol::{ApiEnvelope, RATE_LIMIT_PER_MINUTE},
    tracing::debug,
};

const WINDOW_SECS: i64 = 60;
/// Bucket keys live two windows so the previous bucket is still readable.
const BUCKET_TTL: Duration = Duration::from_secs(150);

#[derive(Clone)]
pub struct RateLimiter {
    kv: KvClient,
    limit: u64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(kv: KvClient) -> Self {
        Self {
            kv,
            limit: RATE_LIMIT_PER_MINUTE,
        }
    }

    #[must_use]
    pub fn with_limit(kv: KvClient, limit: u64) -> Self {
        Self { kv, limit }
    }

    /// Whether this address may proceed. Fail-open: `true` whenever the
    /// counters are unavailable.
    pub async fn allow(&self, ip: IpAddr) -> bool {
        if !self.kv.is_connected() {
            return true;
        }
        let now = now_ms() / 1_000;
        let bucket = now / WINDOW_SECS;
        let elapsed_fraction = (now % WINDOW_SECS) as f64 / WINDOW_SECS as f64;

        let current_key = format!("rate:{ip}:{bucket}");
        let previous_key = format!("rate:{ip}:{}", bucket - 1);

        let Some(current) = self.kv.incr(&current_key, Some(BUCKET_TTL)).await else {
            return true;
        };
        let previous = self
            .kv
            .get(&previous_key)
            .await
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);

        let weighted = previous as f64 * (1.0 - elapsed_fraction) + current as f64;
        let allowed = weighted <= self.limit as f64;
        if !allowed {
            debug!(%ip, weighted, "rate limit exceeded");
        }
        allowed
    }
}

/// Middleware guarding the REST plane.
pub async fn rate_limit_gate(
    State(state): State<crate::state::AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !request.uri().path().starts_with("/api/") {
        return next.run(request).await;
    }
    if state.rate_limiter.allow(addr.ip()).await {
        return next.run(request).await;
    }
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ApiEnvelope::error("rate limit exceeded")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fails_open_without_kv() {
        let limiter = RateLimiter::new(KvClient::disabled());
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        for _ in 0..500 {
            assert!(limiter.allow(ip).await);
        }
    }
}
