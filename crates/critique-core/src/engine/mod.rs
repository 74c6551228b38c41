//! Evaluation orchestrator.

mod combined;
mod fanout;

use crate::aggregate::{ScoreAggregator, TotalPossible};
use crate::config::{OutputFormat, ServiceConfig, Strategy};
use crate::errors::{CritiqueError, EvaluationError};
use crate::model::{Essay, EvaluationReport, RubricCategory};
use crate::prompt::{self, SYSTEM_PROMPT};
use crate::providers::llm::tracing::TracingLlmClient;
use crate::providers::llm::{ChatRequest, LlmClient};
use crate::redaction;
use crate::rubric::RubricSet;
use crate::schema;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};

/// Sequences prompt → gateway → validator → aggregator for one essay at a time.
/// Cheap to share; holds no per-request state.
pub struct Evaluator {
    rubrics: Arc<RubricSet>,
    client: Arc<dyn LlmClient>,
    aggregator: ScoreAggregator,
    strategy: Strategy,
    concurrency: usize,
    temperature: f32,
    top_p: f32,
    output_format: OutputFormat,
}

impl Evaluator {
    /// Resolves `totalPossible` once; every call to [`Evaluator::evaluate`] uses it.
    pub fn new(
        rubrics: Arc<RubricSet>,
        client: Arc<dyn LlmClient>,
        config: &ServiceConfig,
    ) -> Result<Self, CritiqueError> {
        let total = TotalPossible::from_config(config.total_possible, &rubrics);
        let aggregator = ScoreAggregator::new(total, &rubrics)?;
        if config.concurrency == 0 {
            return Err(CritiqueError::config("concurrency must be at least 1"));
        }

        Ok(Self {
            client: Arc::new(TracingLlmClient::new(client)),
            rubrics,
            aggregator,
            strategy: config.strategy,
            concurrency: config.concurrency,
            temperature: config.llm.temperature,
            top_p: config.llm.top_p,
            output_format: config.llm.output_format,
        })
    }

    pub fn rubrics(&self) -> &RubricSet {
        &self.rubrics
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn total_possible(&self) -> u32 {
        self.aggregator.total_possible()
    }

    pub async fn evaluate(&self, essay: &Essay) -> Result<EvaluationReport, EvaluationError> {
        let span = info_span!(
            "evaluation",
            request_id = %uuid::Uuid::new_v4(),
            strategy = %self.strategy,
            essay_digest = %redaction::digest(essay.as_str()),
            essay_chars = essay.char_count(),
        );

        async move {
            let started = Instant::now();
            let result = match self.strategy {
                Strategy::FanOut => fanout::evaluate(self, essay).await,
                Strategy::Combined => combined::evaluate(self, essay).await,
            };
            let latency_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(report) => info!(
                    total_score = report.total_score,
                    deduct_points = report.deduct_points,
                    latency_ms,
                    "evaluation complete"
                ),
                Err(e) => error!(
                    error.kind = e.kind(),
                    category = e.category.as_deref().unwrap_or("-"),
                    error = %e,
                    latency_ms,
                    "evaluation failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    fn category_request(&self, rubric: &RubricCategory, essay: &Essay) -> ChatRequest {
        ChatRequest {
            unit: rubric.key.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user: prompt::build_category_prompt(rubric, essay),
            temperature: self.temperature,
            top_p: self.top_p,
            response_format: self
                .response_format(schema::CATEGORY_SCHEMA_NAME, schema::category_schema),
        }
    }

    fn combined_request(&self, essay: &Essay) -> ChatRequest {
        ChatRequest {
            unit: "combined".to_string(),
            system: SYSTEM_PROMPT.to_string(),
            user: prompt::build_combined_prompt(&self.rubrics, essay, self.total_possible()),
            temperature: self.temperature,
            top_p: self.top_p,
            response_format: self.response_format(schema::REPORT_SCHEMA_NAME, schema::report_schema),
        }
    }

    fn response_format(&self, name: &str, build: fn() -> Value) -> Option<Value> {
        match self.output_format {
            OutputFormat::JsonSchema => Some(schema::json_schema_format(name, build())),
            OutputFormat::JsonObject => Some(json!({ "type": "json_object" })),
            OutputFormat::None => None,
        }
    }
}
