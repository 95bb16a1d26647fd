//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call keystock_common::config::init() first.")
}

/// Initialize the global configuration from environment.
///
/// Should be called once at application startup, before any other code accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8090)?
        .set_default("database.max_connections", 20)?
        .set_default("database.min_connections", 5)?
        .set_default("limits.max_code_length", 512)?
        .set_default("limits.max_codes_per_upload", 1_000)?
        .set_default("limits.default_page_size", 50)?
        .set_default("limits.max_page_size", 200)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (KEYSTOCK_SERVER__HOST, KEYSTOCK_DATABASE__URL, etc.)
        .add_source(
            config::Environment::with_prefix("KEYSTOCK")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub crypto: CryptoConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CryptoConfig {
    /// Master secret for code hashing and encryption — base64-encoded 32 bytes.
    /// Maps to the `KEYSTOCK_CRYPTO__MASTER_KEY` env var.
    pub master_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Maximum accepted length of a single code, in characters, after trimming.
    pub max_code_length: u32,
    /// Maximum number of candidate codes accepted in one upload request.
    pub max_codes_per_upload: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
}
