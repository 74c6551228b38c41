//! Service configuration.
//!
//! Built once at startup: defaults, then an optional YAML file, then
//! `CRITIQUE_*` environment variables. The CLI applies flags on top and
//! calls [`ServiceConfig::validate`] before anything is served.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CRITIQUE_RUBRICS` | `rubrics` |
//! | `CRITIQUE_STRATEGY` | `strategy` (`fan_out` / `combined`) |
//! | `CRITIQUE_TOTAL_POSSIBLE` | `total_possible` |
//! | `CRITIQUE_CONCURRENCY` | `concurrency` |
//! | `CRITIQUE_LLM_BASE_URL` | `llm.base_url` |
//! | `CRITIQUE_LLM_MODEL` | `llm.model` |
//! | `CRITIQUE_LLM_API_KEY_ENV` | `llm.api_key_env` |
//! | `CRITIQUE_LLM_MAX_TOKENS` | `llm.max_tokens` |
//! | `CRITIQUE_LLM_TIMEOUT` | `llm.timeout_secs` |
//! | `CRITIQUE_LLM_OUTPUT_FORMAT` | `llm.output_format` |
//! | `CRITIQUE_LLM_NETWORK` | `llm.network` (`open` / `loopback_only`) |
//! | `CRITIQUE_BIND` | `server.bind` |

use crate::errors::CritiqueError;
use crate::providers::network::NetworkPolicy;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How one essay is split into LLM calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One call per rubric category; malformed categories become zero-score placeholders.
    #[default]
    FanOut,
    /// One schema-enforced call for the whole report; malformed output fails the request.
    Combined,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FanOut => "fan_out",
            Self::Combined => "combined",
        })
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fan_out" | "fanout" => Ok(Self::FanOut),
            "combined" | "single" => Ok(Self::Combined),
            other => Err(format!(
                "unknown strategy '{}' (expected fan_out or combined)",
                other
            )),
        }
    }
}

/// Structured-output mode requested from the provider. DeepSeek only
/// understands `json_object`; `json_schema` is for gateways that enforce schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Strict JSON schema (`additionalProperties: false`, explicit `required`).
    JsonSchema,
    /// Plain JSON mode; the schema is only enforced locally.
    #[default]
    JsonObject,
    None,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::JsonSchema => "json_schema",
            Self::JsonObject => "json_object",
            Self::None => "none",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "json_schema" => Ok(Self::JsonSchema),
            "json_object" => Ok(Self::JsonObject),
            "none" | "off" => Ok(Self::None),
            other => Err(format!(
                "unknown output format '{}' (expected json_schema, json_object or none)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the bearer credential.
    pub api_key_env: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub output_format: OutputFormat,
    pub network: NetworkPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            temperature: 0.2,
            top_p: 0.2,
            max_tokens: 8192,
            timeout_secs: 120,
            output_format: OutputFormat::default(),
            network: NetworkPolicy::default(),
        }
    }
}

impl LlmConfig {
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Credential from the configured environment variable; blank counts as missing.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn require_api_key(&self) -> Result<String, CritiqueError> {
        self.api_key().ok_or_else(|| {
            CritiqueError::config(format!(
                "environment variable {} is not set; no LLM credential available",
                self.api_key_env
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_body_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub rubrics: PathBuf,
    pub strategy: Strategy,
    /// Fixed total possible score. Unset means: corpus-declared total, else the derived sum.
    pub total_possible: Option<u32>,
    pub concurrency: usize,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            rubrics: PathBuf::from("rubrics"),
            strategy: Strategy::default(),
            total_possible: None,
            concurrency: 5,
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Defaults, then `path` (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).with_context(|| {
                    format!("config error: failed to read config {}", p.display())
                })?;
                Self::from_yaml_str(&raw)
                    .with_context(|| format!("config error: invalid config {}", p.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("failed to parse yaml")
    }

    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Some(v) = env_var("CRITIQUE_RUBRICS") {
            self.rubrics = PathBuf::from(v);
        }
        if let Some(v) = env_var("CRITIQUE_STRATEGY") {
            self.strategy = v.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = env_var("CRITIQUE_TOTAL_POSSIBLE") {
            self.total_possible = Some(parse_env("CRITIQUE_TOTAL_POSSIBLE", &v)?);
        }
        if let Some(v) = env_var("CRITIQUE_CONCURRENCY") {
            self.concurrency = parse_env("CRITIQUE_CONCURRENCY", &v)?;
        }
        if let Some(v) = env_var("CRITIQUE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = env_var("CRITIQUE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = env_var("CRITIQUE_LLM_API_KEY_ENV") {
            self.llm.api_key_env = v;
        }
        if let Some(v) = env_var("CRITIQUE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("CRITIQUE_LLM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = env_var("CRITIQUE_LLM_TIMEOUT") {
            self.llm.timeout_secs = parse_env("CRITIQUE_LLM_TIMEOUT", &v)?;
        }
        if let Some(v) = env_var("CRITIQUE_LLM_OUTPUT_FORMAT") {
            self.llm.output_format = v.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = env_var("CRITIQUE_LLM_NETWORK") {
            self.llm.network = v.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = env_var("CRITIQUE_BIND") {
            self.server.bind = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            bail!("config error: concurrency must be at least 1");
        }
        if self.total_possible == Some(0) {
            bail!("config error: total_possible must be positive");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("config error: llm.temperature must be within 0.0..=2.0");
        }
        if !(self.llm.top_p > 0.0 && self.llm.top_p <= 1.0) {
            bail!("config error: llm.top_p must be within (0.0, 1.0]");
        }
        if self.llm.max_tokens == 0 {
            bail!("config error: llm.max_tokens must be positive");
        }
        if self.llm.timeout_secs == 0 {
            bail!("config error: llm.timeout_secs must be positive");
        }
        if self.llm.api_key_env.trim().is_empty() {
            bail!("config error: llm.api_key_env must name an environment variable");
        }
        let url = url::Url::parse(&self.llm.base_url)
            .with_context(|| format!("config error: invalid llm.base_url '{}'", self.llm.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(
                "config error: llm.base_url must use http or https, got '{}'",
                url.scheme()
            );
        }
        if url.scheme() == "http" {
            tracing::warn!(base_url = %self.llm.base_url, "llm.base_url is not HTTPS; credential is sent in clear text");
        }
        if self.server.max_body_bytes == 0 {
            bail!("config error: server.max_body_bytes must be positive");
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("config error: invalid {}='{}': {}", name, raw, e))
}
