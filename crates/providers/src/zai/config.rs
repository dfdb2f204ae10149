use chrono_tz::Tz;
use directories::BaseDirs;
use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};
use tracing::warn;
use zchat_core::ChatError;

const DEFAULT_BASE_URL: &str = "https://chat.z.ai/api";
const DEFAULT_ORIGIN: &str = "https://chat.z.ai";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:140.0) Gecko/20100101 Firefox/140.0";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ZaiFileConfig {
    pub base_url: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    pub frontend_version: Option<String>,
    pub model: Option<String>,
    pub chat_title: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub max_history: Option<usize>,
    pub max_input_chars: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
    pub retry_jitter: Option<bool>,
    pub first_content_timeout_ms: Option<u64>,
    pub completion_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub session_timeout_ms: Option<u64>,
    pub timezone: Option<String>,
    pub default_location: Option<String>,
    pub language: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ZaiConfig {
    pub auth_token: String,
    pub base_url: String,
    pub origin: String,
    pub user_agent: String,
    pub frontend_version: String,
    pub model: String,
    pub chat_title: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub max_history: usize,
    pub max_input_chars: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub retry_jitter: bool,
    pub first_content_timeout: Duration,
    pub completion_timeout: Duration,
    pub connect_timeout: Duration,
    /// Bounds the session call and any error-body read.
    pub session_timeout: Duration,
    pub timezone: Tz,
    pub default_location: String,
    pub language: String,
    pub proxy: Option<String>,
}

impl ZaiConfig {
    /// Defaults with the given credential. Fails on a blank token.
    pub fn new(auth_token: impl Into<String>) -> Result<Self, ChatError> {
        let auth_token = auth_token.into().trim().to_string();
        if auth_token.is_empty() {
            return Err(ChatError::Config("ZAI_AUTH_TOKEN is empty".into()));
        }
        Ok(Self {
            auth_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            frontend_version: "prod-fe-1.0.57".to_string(),
            model: "0727-360B-API".to_string(),
            chat_title: "New Chat".to_string(),
            temperature: 0.8,
            max_tokens: 4000,
            top_p: 0.95,
            max_history: 30,
            max_input_chars: 3500,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            retry_jitter: true,
            first_content_timeout: Duration::from_secs(3),
            completion_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            session_timeout: Duration::from_secs(15),
            timezone: chrono_tz::Europe::Moscow,
            default_location: "Russia".to_string(),
            language: "ru-RU".to_string(),
            proxy: None,
        })
    }

    pub fn from_env_and_file() -> Result<Self, ChatError> {
        let token = env::var("ZAI_AUTH_TOKEN")
            .map_err(|_| ChatError::Config("ZAI_AUTH_TOKEN not set".into()))?;
        let mut cfg = Self::new(token)?;

        if let Some(path) = Self::config_path() {
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(text) => match toml::from_str::<ZaiFileConfig>(&text) {
                        Ok(file_cfg) => cfg.apply_file(file_cfg)?,
                        Err(e) => {
                            warn!(target:"providers::zai","ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        warn!(target:"providers::zai","cannot read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        if let Ok(base) = env::var("ZAI_BASE_URL") {
            cfg.base_url = base;
        }
        cfg.proxy = env::var("HTTPS_PROXY")
            .ok()
            .or_else(|| env::var("HTTP_PROXY").ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_file(&mut self, f: ZaiFileConfig) -> Result<(), ChatError> {
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = f.$field {
                    self.$field = v;
                }
            };
            ($field:ident, $src:ident, ms) => {
                if let Some(v) = f.$src {
                    self.$field = Duration::from_millis(v);
                }
            };
        }
        set!(base_url);
        set!(origin);
        set!(user_agent);
        set!(frontend_version);
        set!(model);
        set!(chat_title);
        set!(temperature);
        set!(max_tokens);
        set!(top_p);
        set!(max_history);
        set!(max_input_chars);
        set!(max_retries);
        set!(retry_delay, retry_delay_ms, ms);
        set!(max_retry_delay, max_retry_delay_ms, ms);
        set!(retry_jitter);
        set!(first_content_timeout, first_content_timeout_ms, ms);
        set!(completion_timeout, completion_timeout_ms, ms);
        set!(connect_timeout, connect_timeout_ms, ms);
        set!(session_timeout, session_timeout_ms, ms);
        set!(default_location);
        set!(language);
        if let Some(tz) = f.timezone {
            self.timezone = tz
                .parse::<Tz>()
                .map_err(|e| ChatError::Config(format!("timezone {tz:?}: {e}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        url::Url::parse(&self.base_url)
            .map_err(|e| ChatError::Config(format!("base_url {:?}: {}", self.base_url, e)))?;
        if self.max_retry_delay < self.retry_delay {
            return Err(ChatError::Config(
                "max_retry_delay must not be below retry_delay".into(),
            ));
        }
        Ok(())
    }

    fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".zchat").join("config.toml")
        } else {
            base.config_dir().join("zchat").join("config.toml")
        };
        Some(p)
    }
}
