//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` and `[server]` is optional; missing fields
//! fall back to the defaults below, which reproduce the behavior the
//! assistant shipped with (300 output tokens, temperature 0.7, three
//! context FAQs, ten requests per minute per client).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            fallback_message: default_fallback_message(),
            top_n: default_top_n(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_persona() -> String {
    "You are GSU SmartAssist, an intelligent chatbot for Gwanda State University (GSU) in Zimbabwe.\n\
You help students, staff, and prospective applicants with questions about admissions, programmes, fees,\n\
academic calendar, library services, ICT support, and general university enquiries.\n\
Be friendly, concise, and professional. If you don't know something specific about GSU,\n\
say so honestly and suggest they contact the university directly."
        .to_string()
}
fn default_fallback_message() -> String {
    "I'm sorry, I couldn't find information on that. \
Please contact GSU directly or visit the main website."
        .to_string()
}
fn default_top_n() -> usize {
    3
}
fn default_max_tokens() -> u32 {
    300
}
fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_limit() -> u32 {
    10
}
fn default_window_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Name of the environment variable holding the token signing secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// Inline secret, used only when the environment variable is unset.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            secret: None,
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
        }
    }
}

impl AuthConfig {
    /// Resolve the signing secret: environment first, then the inline value.
    pub fn resolve_secret(&self) -> Result<String> {
        if let Ok(secret) = std::env::var(&self.secret_env) {
            if !secret.is_empty() {
                return Ok(secret);
            }
        }
        match &self.secret {
            Some(s) if !s.is_empty() => Ok(s.clone()),
            _ => anyhow::bail!(
                "no token secret configured: set {} or auth.secret",
                self.secret_env
            ),
        }
    }
}

fn default_secret_env() -> String {
    "ASSIST_TOKEN_SECRET".to_string()
}
fn default_access_ttl() -> u64 {
    3600
}
fn default_refresh_ttl() -> u64 {
    86400
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chat.top_n == 0 {
        anyhow::bail!("chat.top_n must be >= 1");
    }
    if config.chat.max_tokens == 0 {
        anyhow::bail!("chat.max_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&config.chat.temperature) {
        anyhow::bail!("chat.temperature must be in [0.0, 2.0]");
    }
    if config.chat.fallback_message.trim().is_empty() {
        anyhow::bail!("chat.fallback_message must not be empty");
    }

    if config.rate_limit.limit == 0 {
        anyhow::bail!("rate_limit.limit must be >= 1");
    }
    if config.rate_limit.window_secs == 0 {
        anyhow::bail!("rate_limit.window_secs must be > 0");
    }

    if config.auth.access_ttl_secs == 0 || config.auth.refresh_ttl_secs == 0 {
        anyhow::bail!("auth token lifetimes must be > 0");
    }

    crate::logging::parse_level(&config.log.level)?;

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.llm.is_enabled() && config.llm.model.trim().is_empty() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!(
            r#"
[db]
path = "/tmp/assist.sqlite"

[server]
bind = "127.0.0.1:8000"
{}
"#,
            extra
        );
        let cfg: Config = toml::from_str(&content)?;
        validate(&cfg)?;
        Ok(cfg)
    }

    #[test]
    fn test_defaults_match_shipped_behavior() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.chat.top_n, 3);
        assert_eq!(cfg.chat.max_tokens, 300);
        assert!((cfg.chat.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.rate_limit.limit, 10);
        assert_eq!(cfg.rate_limit.window_secs, 60);
        assert!(!cfg.llm.is_enabled());
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse("[llm]\nprovider = \"bard\"").unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(parse("[rate_limit]\nlimit = 0").is_err());
    }

    #[test]
    fn test_bad_log_level_rejected() {
        assert!(parse("[log]\nlevel = \"loud\"").is_err());
        assert!(parse("[log]\nlevel = \"debug\"").is_ok());
    }

    #[test]
    fn test_inline_secret_used_when_env_missing() {
        let cfg = parse(
            "[auth]\nsecret_env = \"ASSIST_TEST_SECRET_UNSET_VAR\"\nsecret = \"inline-secret\"",
        )
        .unwrap();
        assert_eq!(cfg.auth.resolve_secret().unwrap(), "inline-secret");
    }

    #[test]
    fn test_missing_secret_errors() {
        let cfg = parse("[auth]\nsecret_env = \"ASSIST_TEST_SECRET_UNSET_VAR\"").unwrap();
        assert!(cfg.auth.resolve_secret().is_err());
    }
}
