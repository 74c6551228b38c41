//! Strict JSON schemas for model output.
//!
//! The same schema is sent to the provider as `response_format` and compiled
//! locally for validation, so the two sides never disagree about shape.

use serde_json::{json, Value};
use std::sync::OnceLock;

pub const CATEGORY_SCHEMA_NAME: &str = "category_evaluation";
pub const REPORT_SCHEMA_NAME: &str = "essay_evaluation";

fn example_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "original": { "type": "string" },
            "issue": { "type": "string" },
            "suggestion": { "type": "string" },
            "reason": { "type": "string" },
            "comparison": { "type": "string" }
        },
        "required": ["original", "issue", "suggestion", "reason", "comparison"],
        "additionalProperties": false
    })
}

fn standard_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "standardName": { "type": "string" },
            "score": { "type": "integer" },
            "maxScore": { "type": "integer" },
            "problem": { "type": "string" },
            "examples": { "type": "array", "items": example_schema() }
        },
        "required": ["standardName", "score", "maxScore", "problem", "examples"],
        "additionalProperties": false
    })
}

/// Schema for one category evaluated in isolation.
pub fn category_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "categoryName": { "type": "string" },
            "score": { "type": "integer" },
            "maxScore": { "type": "integer" },
            "standards": { "type": "array", "items": standard_schema() }
        },
        "required": ["categoryName", "score", "maxScore", "standards"],
        "additionalProperties": false
    })
}

/// Schema for the full report produced by a single combined call.
pub fn report_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "totalScore": { "type": "integer" },
            "deductPoints": { "type": "integer" },
            "overallSummary": { "type": "string" },
            "categories": { "type": "array", "items": category_schema() }
        },
        "required": ["totalScore", "deductPoints", "overallSummary", "categories"],
        "additionalProperties": false
    })
}

/// OpenAI-style `response_format` wrapper with `strict: true`.
pub fn json_schema_format(name: &str, schema: Value) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": name,
            "strict": true,
            "schema": schema
        }
    })
}

static CATEGORY_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static REPORT_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn compile(name: &str, schema: &Value) -> Result<jsonschema::Validator, String> {
    jsonschema::options()
        .with_draft(jsonschema::Draft::Draft202012)
        .build(schema)
        .map_err(|e| format!("failed to compile {name} schema: {e}"))
}

pub(crate) fn category_validator() -> Result<&'static jsonschema::Validator, String> {
    CATEGORY_VALIDATOR
        .get_or_init(|| compile(CATEGORY_SCHEMA_NAME, &category_schema()))
        .as_ref()
        .map_err(Clone::clone)
}

pub(crate) fn report_validator() -> Result<&'static jsonschema::Validator, String> {
    REPORT_VALIDATOR
        .get_or_init(|| compile(REPORT_SCHEMA_NAME, &report_schema()))
        .as_ref()
        .map_err(Clone::clone)
}

/// Bounded, line-numbered list of schema violations. Empty when the instance is valid.
/// Names the keyword and location only; offending values are model text.
pub(crate) fn violations(validator: &jsonschema::Validator, instance: &Value) -> Vec<String> {
    const MAX_ERRORS: usize = 5;

    if validator.is_valid(instance) {
        return Vec::new();
    }
    validator
        .iter_errors(instance)
        .take(MAX_ERRORS)
        .enumerate()
        .map(|(i, e)| {
            format!(
                "{:02}: '{}' failed at '{}'",
                i + 1,
                e.kind().keyword(),
                e.instance_path()
            )
        })
        .collect()
}
