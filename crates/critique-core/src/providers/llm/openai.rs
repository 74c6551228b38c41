//! OpenAI-compatible chat-completions client (DeepSeek by default).
//!
//! The only place that knows the wire format and interprets HTTP status codes.

use super::{ChatRequest, LlmClient, LlmResponse, Usage};
use crate::config::LlmConfig;
use crate::errors::CritiqueError;
use crate::providers::network::NetworkPolicy;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde_json::{json, Value};
use std::time::Duration;

const USER_AGENT_VALUE: &str = concat!("critique/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 2000;

pub struct ChatCompletionsClient {
    url: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
    network: NetworkPolicy,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    /// `api_key: None` is allowed here; every call then fails with `Config` before any I/O.
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self, CritiqueError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| CritiqueError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: config.chat_completions_url(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            network: config.network,
            client,
        })
    }

    /// Credential read from `config.api_key_env`.
    pub fn from_env(config: &LlmConfig) -> Result<Self, CritiqueError> {
        Self::new(config, config.api_key())
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages(),
            "temperature": request.temperature,
            "top_p": request.top_p,
            "max_tokens": self.max_tokens,
        });
        if let Some(format) = &request.response_format {
            body["response_format"] = format.clone();
        }
        body
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse, CritiqueError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            CritiqueError::config("no LLM API credential configured; refusing to send request")
        })?;
        self.network.check(&self.url)?;

        let resp = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&self.body(request))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            let error_text: String = error_text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(CritiqueError::transport(
                Some(status.as_u16()),
                format!("chat completion failed: {}", error_text),
            ));
        }

        let json: Value = resp.json().await.map_err(|e| {
            CritiqueError::transport(
                Some(status.as_u16()),
                format!("chat completion response is not JSON: {}", e),
            )
        })?;

        parse_completion(&json, &self.model)
    }

    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn parse_completion(json: &Value, requested_model: &str) -> Result<LlmResponse, CritiqueError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CritiqueError::malformed("chat completion response missing content"))?
        .to_string();

    let usage = Usage {
        prompt_tokens: json.pointer("/usage/prompt_tokens").and_then(Value::as_u64),
        completion_tokens: json
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64),
    };

    Ok(LlmResponse {
        text,
        provider: "openai-compatible".to_string(),
        model: json
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(requested_model)
            .to_string(),
        usage,
        finish_reason: json
            .pointer("/choices/0/finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}
