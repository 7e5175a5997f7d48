//! Config schema types (gateway, identity provider, system of record, redis).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TinchatConfig {
    pub gateway: GatewayConfig,
    pub identity: IdentityConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cors: CorsConfig,
    /// Log level for the `tracing` subscriber.
    pub log_level: LogLevel,
    /// Export Prometheus metrics and time REST fetches. Defaults to on.
    pub performance_monitoring: bool,
}

impl Default for TinchatConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            identity: IdentityConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            cors: CorsConfig::default(),
            log_level: LogLevel::default(),
            performance_monitoring: true,
        }
    }
}

impl TinchatConfig {
    /// Authenticated sessions require the identity provider secret.
    #[must_use]
    pub fn identity_enabled(&self) -> bool {
        self.identity.secret_key.is_some()
    }

    /// Profiles/friends features require the system of record; without it the
    /// matchmaker still works.
    #[must_use]
    pub fn database_enabled(&self) -> bool {
        self.database.url.is_some()
    }

    /// Remote cache tier and cross-restart queue persistence.
    #[must_use]
    pub fn redis_enabled(&self) -> bool {
        self.redis.url.is_some()
    }
}

/// Gateway listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3001,
        }
    }
}

/// External identity provider (token issuance and user lookup).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Secret API key. Absent → anonymous-only operation.
    pub secret_key: Option<String>,
    pub publishable_key: Option<String>,
    /// Provider API base URL.
    pub base_url: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            publishable_key: None,
            base_url: "https://api.clerk.com/v1".into(),
        }
    }
}

/// System of record (profiles, friendships, requests, blocks, messages).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL. Absent → profile/friends features disabled.
    pub url: Option<String>,
    pub service_key: Option<String>,
    /// Pool size for the sqlx pool.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            max_connections: 10,
        }
    }
}

/// Remote key-value store (shared cache + queue mirror).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL. Absent → in-process caches only.
    pub url: Option<String>,
    pub token: Option<String>,
}

/// Process-wide CORS origin allow-list, initialized at start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".into()],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "error" => Some(Self::Error),
            "warn" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }
}
