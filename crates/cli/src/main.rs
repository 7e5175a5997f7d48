use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "tinchat", about = "TinChat — realtime stranger-pairing chat server")]
struct Cli {
    /// Log level (error, warn, info, debug). Overrides config.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, env = "TINCHAT_BIND")]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long, env = "TINCHAT_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = tinchat_config::discover_and_load();
    if let Some(bind) = cli.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(level) = cli.log_level.as_deref().and_then(tinchat_config::LogLevel::parse) {
        config.log_level = level;
    }

    init_tracing(config.log_level.as_filter(), cli.json_logs);

    let metrics_handle = if config.performance_monitoring {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "metrics recorder unavailable, continuing without");
                None
            },
        }
    } else {
        None
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        identity = config.identity_enabled(),
        database = config.database_enabled(),
        redis = config.redis_enabled(),
        "starting tinchat"
    );

    let state = tinchat_gateway::server::build_state(config, metrics_handle).await?;
    tinchat_gateway::run(state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tinchat={level},tinchat_gateway={level},info")));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
