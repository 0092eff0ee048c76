// src/config.rs
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::env;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    Gemini,
    Sim,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub backend: ModelBackend,
    pub endpoint: String,
    pub model: String,
    /// Takes precedence over `api_key_env` when set.
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub upload_temperature: f32,
    pub live_temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub backend: StorageBackend,
    pub sqlite_path: String,
    pub redis_url: String,
    pub key: String,
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveConfig {
    pub period_secs: u32,
    pub trigger_at_secs: u32,
    /// Browser frames older than this are not analysed.
    pub frame_max_age_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub environment: String,
    pub log_level: String,
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub history: HistoryConfig,
    pub live: LiveConfig,
}

impl AppConfig {
    /// Layers built-in defaults, `config/default.toml`, `config/{RUN_MODE}.toml`,
    /// an optional explicit file and `APP__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Self::defaults()?
            .add_source(File::new("config/default.toml", FileFormat::Toml).required(false))
            .add_source(
                File::new(&format!("config/{}.toml", run_mode), FileFormat::Toml).required(false),
            );
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        let config: AppConfig = builder
            .set_override("environment", run_mode)?
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("name", "prisma-signal")?
            .set_default("version", env!("CARGO_PKG_VERSION"))?
            .set_default("environment", "development")?
            .set_default("log_level", "info")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080i64)?
            .set_default("server.static_dir", "./static")?
            .set_default("server.max_upload_bytes", 10i64 * 1024 * 1024)?
            .set_default("model.backend", "gemini")?
            .set_default(
                "model.endpoint",
                "https://generativelanguage.googleapis.com/v1beta",
            )?
            .set_default("model.model", "gemini-2.5-flash")?
            .set_default("model.api_key_env", "GEMINI_API_KEY")?
            .set_default("model.upload_temperature", 0.2f64)?
            .set_default("model.live_temperature", 0.1f64)?
            .set_default("model.timeout_secs", 60i64)?
            .set_default("history.backend", "sqlite")?
            .set_default("history.sqlite_path", "prisma.db")?
            .set_default("history.redis_url", "redis://127.0.0.1/")?
            .set_default("history.key", "prismaAiHistory")?
            .set_default("history.capacity", 5i64)?
            .set_default("live.period_secs", 60i64)?
            .set_default("live.trigger_at_secs", 3i64)?
            .set_default("live.frame_max_age_secs", 10i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.live.period_secs == 0 || self.live.trigger_at_secs >= self.live.period_secs {
            return Err(AppError::Config(format!(
                "live.trigger_at_secs ({}) must be below live.period_secs ({})",
                self.live.trigger_at_secs, self.live.period_secs
            )));
        }
        if self.history.capacity == 0 {
            return Err(AppError::Config("history.capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn get_server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            name: "prisma-signal".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            environment: "development".into(),
            log_level: "info".into(),
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                static_dir: "./static".into(),
                max_upload_bytes: 10 * 1024 * 1024,
            },
            model: ModelConfig {
                backend: ModelBackend::Gemini,
                endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
                model: "gemini-2.5-flash".into(),
                api_key: None,
                api_key_env: "GEMINI_API_KEY".into(),
                upload_temperature: 0.2,
                live_temperature: 0.1,
                timeout_secs: 60,
            },
            history: HistoryConfig {
                backend: StorageBackend::Sqlite,
                sqlite_path: "prisma.db".into(),
                redis_url: "redis://127.0.0.1/".into(),
                key: "prismaAiHistory".into(),
                capacity: 5,
            },
            live: LiveConfig {
                period_secs: 60,
                trigger_at_secs: 3,
                frame_max_age_secs: 10,
            },
        }
    }
}
