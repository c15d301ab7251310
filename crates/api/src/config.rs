use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use view::PromptLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// `None` runs from the local store only
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_chat_messages: usize,
    pub prompt_vocabulary_limit: usize,
    pub prompt_history_turns: usize,
    /// Sessions quiet for this long are dropped; 0 keeps them forever
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig {
                base_url: Some("http://localhost:8000".to_string()),
                timeout_secs: 30,
            },
            store: StoreConfig {
                path: PathBuf::from("db/chapter_analysis_collection"),
            },
            session: SessionConfig {
                max_chat_messages: 50,
                prompt_vocabulary_limit: 5,
                prompt_history_turns: 10,
                idle_timeout_secs: 3600,
            },
            server: ServerConfig {
                bind_addr: "0.0.0.0:3000".to_string(),
                log_format: LogFormat::Text,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` knows about
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("API_BASE_URL") {
            let url = url.trim();
            config.remote.base_url = (!url.is_empty()).then(|| url.to_string());
        }
        if let Some(raw) = lookup("API_TIMEOUT") {
            config.remote.timeout_secs = parse_number("API_TIMEOUT", &raw)?;
            if config.remote.timeout_secs == 0 {
                anyhow::bail!("API_TIMEOUT must be at least one second");
            }
        }
        if let Some(path) = lookup("ANALYSIS_STORE_PATH") {
            config.store.path = PathBuf::from(path.trim());
        }
        if let Some(raw) = lookup("MAX_CHAT_MESSAGES") {
            config.session.max_chat_messages = parse_number("MAX_CHAT_MESSAGES", &raw)?;
        }
        if let Some(raw) = lookup("PROMPT_VOCABULARY_LIMIT") {
            config.session.prompt_vocabulary_limit = parse_number("PROMPT_VOCABULARY_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("PROMPT_HISTORY_TURNS") {
            config.session.prompt_history_turns = parse_number("PROMPT_HISTORY_TURNS", &raw)?;
        }
        if let Some(raw) = lookup("SESSION_IDLE_SECS") {
            config.session.idle_timeout_secs = parse_number("SESSION_IDLE_SECS", &raw)?;
        }
        if let Some(addr) = lookup("COMPANION_BIND_ADDR") {
            config.server.bind_addr = addr.trim().to_string();
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.server.log_format = match format.trim().to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            };
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Option<Duration> {
        (self.session.idle_timeout_secs > 0).then(|| Duration::from_secs(self.session.idle_timeout_secs))
    }

    pub fn prompt_limits(&self) -> PromptLimits {
        PromptLimits {
            vocabulary: self.session.prompt_vocabulary_limit,
            history_turns: self.session.prompt_history_turns,
        }
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
}
