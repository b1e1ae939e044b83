//! Runtime settings.
//!
//! Sources, lowest precedence first: serde defaults, an optional
//! `visamock.{toml,json,yaml}` in the working directory, then `VISAMOCK_*`
//! environment variables (`__` separates nested keys, so
//! `VISAMOCK_COMPLETION__API_KEY` sets `completion.api_key`).

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use log::{info, warn};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub completion: CompletionSettings,
    pub database: DatabaseSettings,
    pub speech: SpeechSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.x.ai/v1".to_string(),
            api_key: String::new(),
            model: "grok-3-latest".to_string(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// When false the in-memory store is used and nothing outlives the process.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 5432,
            dbname: "visamock_db".to_string(),
            user: "visamock_user".to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// External text-to-speech program invoked as `<cmd> <text>`, e.g. `say`.
    pub tts_command: Option<String>,
}


impl Settings {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let settings: Settings = Config::builder()
            .add_source(File::with_name("visamock").required(false))
            .add_source(
                Environment::with_prefix("VISAMOCK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if settings.completion.api_key.is_empty() {
            warn!("❌ Completion API key not configured - requests will be rejected and questions will come from the fallback pool");
        } else {
            info!(
                "✅ Completion endpoint {} (model {}, key length {})",
                settings.completion.base_url,
                settings.completion.model,
                settings.completion.api_key.len()
            );
        }

        Ok(settings)
    }
}
