//! Router assembly, background tickers, startup and graceful shutdown.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        http::{HeaderValue, Method},
        routing::get,
    },
    metrics::gauge,
    tinchat_auth::IdentityVerifier,
    tinchat_cache::KvClient,
    tinchat_common::now_ms,
    tinchat_config::TinchatConfig,
    tinchat_matchmaker::Matchmaker,
    tinchat_profiles::ProfileManager,
    tinchat_sessions::SessionManager,
    tokio_util::sync::CancellationToken,
    tower_http::cors::{AllowOrigin, Any, CorsLayer},
    tracing::info,
};

use crate::{friends_routes, rate_limit, state::AppState, ws};

/// Socket heartbeat / matchmaker stale sweep cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Profile LRU sweep cadence; entries older than [`LRU_MAX_AGE`] go.
const LRU_SWEEP_INTERVAL: Duration = Duration::from_secs(120);
const LRU_MAX_AGE: Duration = Duration::from_secs(60);
/// Remote housekeeping cadence (stale-offline sweep, message retention).
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(300);

/// Wire the full application state from config.
pub async fn build_state(
    config: TinchatConfig,
    metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<AppState> {
    let cancel = CancellationToken::new();

    let kv = match &config.redis.url {
        Some(url) => KvClient::connect(url, cancel.clone()).await,
        None => {
            info!("no key-value store configured, in-process caches only");
            KvClient::disabled()
        },
    };

    let pool = match &config.database.url {
        Some(url) => Some(tinchat_store::connect(url, config.database.max_connections).await?),
        None => {
            info!("no system of record configured, profile/friends features disabled");
            None
        },
    };

    let verifier = config.identity.secret_key.as_ref().map(|secret| {
        Arc::new(IdentityVerifier::new(
            config.identity.base_url.clone(),
            secret.clone(),
        ))
    });
    if verifier.is_none() {
        info!("no identity provider configured, anonymous sessions only");
    }

    let profile_manager = Arc::new(ProfileManager::new(pool, kv.clone(), cancel.clone()));
    let matchmaker = Arc::new(Matchmaker::new(kv.clone()));
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&matchmaker),
        profile_manager.presence.clone(),
        kv.clone(),
        profile_manager.messages.clone(),
    ));

    profile_manager.warm_cache().await;
    matchmaker.restore_from_mirror().await;

    Ok(AppState {
        rate_limiter: rate_limit::RateLimiter::new(kv.clone()),
        config: Arc::new(config),
        sessions,
        profile_manager,
        matchmaker,
        verifier,
        kv,
        metrics_handle,
        cancel,
        started_at: now_ms(),
    })
}

/// Build the router (shared between production startup and tests).
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    let mut router = Router::new()
        .route("/ws", get(ws::ws_upgrade_handler))
        .nest("/api/friends", friends_routes::friends_router());

    if state.metrics_handle.is_some() {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_gate,
        ))
        .layer(cors)
        .with_state(state)
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// CORS from the configured allow-list. An explicit `*` entry opens the
/// surface (development only).
fn build_cors_layer(config: &TinchatConfig) -> CorsLayer {
    let origins = &config.cors.allowed_origins;
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Spawn the background tickers. Every body is wrapped: a failing sweep
/// logs and the ticker continues; a background task never takes the server
/// down.
pub fn spawn_tickers(state: &AppState) {
    let cancel = state.cancel.clone();

    // Socket heartbeat + matchmaker stale sweep.
    {
        let sessions = Arc::clone(&state.sessions);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {},
                }
                let swept = sessions.heartbeat_sweep().await;
                gauge!("tinchat_connections").set(sessions.connection_count().await as f64);
                gauge!("tinchat_rooms").set(sessions.room_count().await as f64);
                if swept > 0 {
                    info!(swept, "heartbeat sweep");
                }
            }
        });
    }

    // Profile LRU sweep.
    {
        let manager = Arc::clone(&state.profile_manager);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LRU_SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {},
                }
                let swept = manager.sweep_profile_cache(LRU_MAX_AGE);
                if swept > 0 {
                    info!(swept, "profile cache sweep");
                }
            }
        });
    }

    // Remote housekeeping.
    {
        let manager = Arc::clone(&state.profile_manager);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {},
                }
                manager.housekeeping().await;
            }
        });
    }
}

/// Bind, serve, and block until shutdown completes. `shutdown` resolves when
/// the process wants to exit (ctrl-c in the CLI).
pub async fn run(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.gateway.bind, state.config.gateway.port
    )
    .parse()?;

    spawn_tickers(&state);

    let router = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");

    let cancel = state.cancel.clone();
    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        info!("shutdown signal received");
        cancel.cancel();
    });

    serve.await?;

    // Tear down in order: tickers are already cancelled; drain presence and
    // clear caches before the process exits.
    state.profile_manager.shutdown().await;
    info!("gateway stopped");
    Ok(())
}
