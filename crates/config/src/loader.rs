use std::path::Path;

use tracing::{debug, warn};

use crate::schema::{LogLevel, TinchatConfig};

const CONFIG_FILENAME: &str = "tinchat.toml";

/// Load config from `./tinchat.toml` if present, then apply `TINCHAT_*`
/// environment overrides. `.env` is read first so both sources see it.
#[must_use]
pub fn discover_and_load() -> TinchatConfig {
    let _ = dotenvy::dotenv();

    let mut config = load_file(Path::new(CONFIG_FILENAME)).unwrap_or_else(|| {
        debug!("no config file found, using defaults");
        TinchatConfig::default()
    });
    apply_env_overrides(&mut config);
    config
}

fn load_file(path: &Path) -> Option<TinchatConfig> {
    if !path.exists() {
        return None;
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read config, using defaults");
            return None;
        },
    };
    match toml::from_str(&raw) {
        Ok(cfg) => {
            debug!(path = %path.display(), "loaded config");
            Some(cfg)
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
            None
        },
    }
}

/// Apply environment variable overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut TinchatConfig) {
    if let Some(bind) = env_string("TINCHAT_BIND") {
        config.gateway.bind = bind;
    }
    if let Some(port) = env_string("TINCHAT_PORT").and_then(|p| p.parse().ok()) {
        config.gateway.port = port;
    }

    if let Some(secret) = env_string("TINCHAT_IDENTITY_SECRET") {
        config.identity.secret_key = Some(secret);
    }
    if let Some(publishable) = env_string("TINCHAT_IDENTITY_PUBLISHABLE_KEY") {
        config.identity.publishable_key = Some(publishable);
    }
    if let Some(base) = env_string("TINCHAT_IDENTITY_BASE_URL") {
        config.identity.base_url = base;
    }

    if let Some(url) = env_string("TINCHAT_DATABASE_URL").or_else(|| env_string("DATABASE_URL")) {
        config.database.url = Some(url);
    }
    if let Some(key) = env_string("TINCHAT_DATABASE_SERVICE_KEY") {
        config.database.service_key = Some(key);
    }

    if let Some(url) = env_string("TINCHAT_REDIS_URL").or_else(|| env_string("REDIS_URL")) {
        config.redis.url = Some(url);
    }
    if let Some(token) = env_string("TINCHAT_REDIS_TOKEN") {
        config.redis.token = Some(token);
    }

    if let Some(level) = env_string("TINCHAT_LOG_LEVEL") {
        match LogLevel::parse(&level) {
            Some(parsed) => config.log_level = parsed,
            None => warn!(level, "unrecognized TINCHAT_LOG_LEVEL, keeping current"),
        }
    }

    if let Some(flag) = env_string("TINCHAT_PERFORMANCE_MONITORING") {
        config.performance_monitoring = matches!(flag.as_str(), "1" | "true" | "on");
    }

    if let Some(origins) = env_string("TINCHAT_CORS_ORIGINS") {
        config.cors.allowed_origins = parse_origin_list(&origins);
    }
}

fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = TinchatConfig::default();
        assert!(!config.identity_enabled());
        assert!(!config.database_enabled());
        assert!(!config.redis_enabled());
        assert_eq!(config.gateway.port, 3001);
        assert!(config.performance_monitoring);
    }

    #[test]
    fn toml_file_parses() {
        let raw = r#"
            log_level = "debug"
            performance_monitoring = false

            [gateway]
            bind = "127.0.0.1"
            port = 4000

            [redis]
            url = "redis://localhost:6379"

            [cors]
            allowed_origins = ["https://tinchat.online"]
        "#;
        let config: TinchatConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.gateway.port, 4000);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(!config.performance_monitoring);
        assert!(config.redis_enabled());
        assert_eq!(config.cors.allowed_origins, vec!["https://tinchat.online"]);
    }

    #[test]
    fn origin_list_splits_and_trims() {
        assert_eq!(
            parse_origin_list("https://a.example, https://b.example,,"),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn log_level_vocabulary() {
        assert_eq!(LogLevel::parse("warn"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("trace"), None);
    }
}
