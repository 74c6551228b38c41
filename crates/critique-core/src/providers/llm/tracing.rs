use super::{ChatRequest, LlmClient, LlmResponse};
use crate::errors::CritiqueError;
use crate::redaction;
use ::tracing::{field::Empty, info_span, warn, Instrument};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Wraps a client in an `llm.request` span. Prompts are recorded as a digest only.
pub struct TracingLlmClient {
    inner: Arc<dyn LlmClient>,
}

impl TracingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LlmClient for TracingLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse, CritiqueError> {
        let span = info_span!(
            "llm.request",
            provider = self.inner.provider_name(),
            model = self.inner.model(),
            unit = request.unit.as_str(),
            prompt_digest = redaction::digest(&request.user).as_str(),
            latency_ms = Empty,
            input_tokens = Empty,
            output_tokens = Empty,
            finish_reason = Empty,
            error = Empty,
        );

        async move {
            let start = Instant::now();
            let result = self.inner.complete(request).await;
            let span = ::tracing::Span::current();
            span.record("latency_ms", start.elapsed().as_millis() as u64);

            match &result {
                Ok(resp) => {
                    if let Some(n) = resp.usage.prompt_tokens {
                        span.record("input_tokens", n);
                    }
                    if let Some(n) = resp.usage.completion_tokens {
                        span.record("output_tokens", n);
                    }
                    if let Some(reason) = resp.finish_reason.as_deref() {
                        span.record("finish_reason", reason);
                    }
                    if resp.truncated() {
                        warn!(unit = %request.unit, "completion hit the token limit; output is likely cut off");
                    }
                }
                Err(e) => {
                    span.record("error", e.kind());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
