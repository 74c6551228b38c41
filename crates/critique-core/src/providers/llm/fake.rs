//! Scripted in-process client for tests and offline runs.

use super::{ChatRequest, LlmClient, LlmResponse, Usage};
use crate::errors::CritiqueError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(CritiqueError),
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    reply: Reply,
    /// Skip the configured delay.
    immediate: bool,
}

/// Replies are chosen by the first rule whose needle occurs in the user message.
#[derive(Debug, Default)]
pub struct FakeClient {
    rules: Vec<Rule>,
    default: Option<Reply>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_when(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Text(text.into()),
            immediate: false,
        });
        self
    }

    pub fn fail_when(mut self, needle: impl Into<String>, error: CritiqueError) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Fail(error),
            immediate: false,
        });
        self
    }

    /// Like [`fail_when`](Self::fail_when), but returns without waiting out `with_delay`.
    pub fn fail_fast_when(mut self, needle: impl Into<String>, error: CritiqueError) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Fail(error),
            immediate: true,
        });
        self
    }

    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.default = Some(Reply::Text(text.into()));
        self
    }

    /// Hold every call for `delay`; used to observe concurrency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls started, including ones later cancelled.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that ran to the end and returned a reply or an error.
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn pick(&self, request: &ChatRequest) -> (Option<Reply>, bool) {
        match self.rules.iter().find(|r| request.user.contains(&r.needle)) {
            Some(rule) => (Some(rule.reply.clone()), rule.immediate),
            None => (self.default.clone(), false),
        }
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse, CritiqueError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());

        let (reply, immediate) = self.pick(request);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let (Some(delay), false) = (self.delay, immediate) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        match reply {
            Some(Reply::Text(text)) => Ok(LlmResponse {
                text,
                provider: "fake".to_string(),
                model: "fake-model".to_string(),
                usage: Usage::default(),
                finish_reason: Some("stop".to_string()),
            }),
            Some(Reply::Fail(err)) => Err(err),
            None => Err(CritiqueError::malformed(format!(
                "fake client has no reply for unit {}",
                request.unit
            ))),
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}
