//! Shared gateway runtime state.

use std::sync::Arc;

use {
    metrics_exporter_prometheus::PrometheusHandle,
    tinchat_auth::IdentityVerifier,
    tinchat_cache::KvClient,
    tinchat_config::TinchatConfig,
    tinchat_matchmaker::Matchmaker,
    tinchat_profiles::ProfileManager,
    tinchat_sessions::SessionManager,
    tokio_util::sync::CancellationToken,
};

use crate::rate_limit::RateLimiter;

/// Everything the handlers need, constructed once at startup and passed by
/// reference. Each piece of mutable state has exactly one owner; handlers go
/// through that owner's API.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TinchatConfig>,
    pub sessions: Arc<SessionManager>,
    pub profile_manager: Arc<ProfileManager>,
    pub matchmaker: Arc<Matchmaker>,
    /// `None` when no identity provider is configured (anonymous-only).
    pub verifier: Option<Arc<IdentityVerifier>>,
    pub kv: KvClient,
    pub rate_limiter: RateLimiter,
    pub metrics_handle: Option<PrometheusHandle>,
    pub cancel: CancellationToken,
    pub started_at: i64,
}
