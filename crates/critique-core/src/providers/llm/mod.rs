//! LLM gateway: one chat-completion request in, raw completion text out.

pub mod fake;
pub mod openai;
pub mod tracing;

use crate::errors::CritiqueError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// One completion request. `unit` labels the work item in logs (category key or `combined`).
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub unit: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub top_p: f32,
    /// Provider `response_format` value, passed through untouched.
    pub response_format: Option<Value>,
}

impl ChatRequest {
    pub fn messages(&self) -> [ChatMessage; 2] {
        [
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub usage: Usage,
    /// `length` means the completion hit the token cap and the JSON is likely cut off.
    pub finish_reason: Option<String>,
}

impl LlmResponse {
    pub fn truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Remote text-completion service. Implementations must be safe to retry:
/// no side effects beyond the remote call itself.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse, CritiqueError>;

    fn provider_name(&self) -> &'static str;

    fn model(&self) -> &str;
}
