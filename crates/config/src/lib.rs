//! Configuration loading and env overrides.
//!
//! Config file: `tinchat.toml`, searched in `./`. Every value can also be set
//! (or overridden) through `TINCHAT_*` environment variables, which is the
//! normal deployment path; the file exists for local development.

pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, discover_and_load},
    schema::{
        CorsConfig, DatabaseConfig, GatewayConfig, IdentityConfig, LogLevel, RedisConfig,
        TinchatConfig,
    },
};
