//! Orchestrator contract tests against a scripted LLM client.
//!
//! Covers both strategies: isolated-category fallback, combined-mode fatality,
//! transport failures, ordering, bounded concurrency and total resolution.

use critique_core::aggregate::FAN_OUT_SUMMARY;
use critique_core::prompt::SYSTEM_PROMPT;
use critique_core::providers::llm::fake::FakeClient;
use critique_core::{
    CritiqueError, Essay, Evaluator, LlmConfig, OutputFormat, RubricCategory, RubricItem,
    RubricSet, ServiceConfig, Strategy,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

fn category(key: &str, items: &[&str]) -> RubricCategory {
    RubricCategory {
        key: key.to_string(),
        category: key.to_string(),
        items: items
            .iter()
            .map(|n| {
                let mut anchors = Map::new();
                anchors.insert("5".into(), json!(format!("{n}: excellent")));
                anchors.insert("1".into(), json!(format!("{n}: poor")));
                RubricItem {
                    name: n.to_string(),
                    anchors,
                }
            })
            .collect(),
    }
}

fn rubrics(categories: Vec<RubricCategory>) -> Arc<RubricSet> {
    Arc::new(RubricSet::from_categories(categories, None).expect("valid rubric set"))
}

fn clarity_output() -> Value {
    json!({
        "categoryName": "Clarity",
        "score": 2,
        "maxScore": 5,
        "standards": [{
            "standardName": "Specificity",
            "score": 2,
            "maxScore": 5,
            "problem": "Too vague",
            "examples": [{
                "original": "I love science.",
                "issue": "No concrete detail",
                "suggestion": "Name a specific project",
                "reason": "Specificity builds credibility",
                "comparison": "Vague vs. concrete claim"
            }]
        }]
    })
}

fn config(strategy: Strategy) -> ServiceConfig {
    ServiceConfig {
        strategy,
        llm: LlmConfig {
            output_format: OutputFormat::JsonSchema,
            ..LlmConfig::default()
        },
        ..ServiceConfig::default()
    }
}

fn essay() -> Essay {
    Essay::new("I love science.").expect("non-empty essay")
}

#[tokio::test]
async fn fan_out_single_category_example() {
    let fake = Arc::new(FakeClient::new().with_default(clarity_output().to_string()));
    let ev = Evaluator::new(
        rubrics(vec![category("Clarity", &["Specificity"])]),
        fake.clone(),
        &config(Strategy::FanOut),
    )
    .expect("evaluator");

    let report = ev.evaluate(&essay()).await.expect("report");
    assert_eq!(report.total_score, 2);
    assert_eq!(report.deduct_points, 3);
    assert_eq!(report.overall_summary, FAN_OUT_SUMMARY);
    assert_eq!(report.categories[0].standards[0].problem, "Too vague");
    assert_eq!(fake.call_count(), 1);
}

#[tokio::test]
async fn fan_out_request_carries_prompt_schema_and_sampling() {
    let fake = Arc::new(FakeClient::new().with_default(clarity_output().to_string()));
    let ev = Evaluator::new(
        rubrics(vec![category("Clarity", &["Specificity"])]),
        fake.clone(),
        &config(Strategy::FanOut),
    )
    .unwrap();
    ev.evaluate(&essay()).await.unwrap();

    let req = &fake.requests()[0];
    assert_eq!(req.unit, "Clarity");
    assert_eq!(req.system, SYSTEM_PROMPT);
    assert!(req.user.contains("<essay>\nI love science.\n</essay>"));
    assert!(req.user.contains("Specificity: excellent"));
    assert!((req.temperature - 0.2).abs() < f32::EPSILON);
    assert!((req.top_p - 0.2).abs() < f32::EPSILON);

    let format = req.response_format.as_ref().expect("schema attached");
    assert_eq!(format["type"], "json_schema");
    assert_eq!(format["json_schema"]["name"], "category_evaluation");
    assert_eq!(format["json_schema"]["strict"], true);
    assert_eq!(
        format["json_schema"]["schema"]["additionalProperties"],
        false
    );
}

#[tokio::test]
async fn fan_out_malformed_category_becomes_placeholder() {
    let fake = Arc::new(
        FakeClient::new()
            .reply_when("following category: Clarity", clarity_output().to_string())
            .reply_when("following category: Voice", "Sorry, I cannot help with that."),
    );
    let ev = Evaluator::new(
        rubrics(vec![
            category("Clarity", &["Specificity"]),
            category("Voice", &["Tone", "Detail"]),
        ]),
        fake.clone(),
        &config(Strategy::FanOut),
    )
    .unwrap();

    let report = ev.evaluate(&essay()).await.expect("placeholder keeps report alive");
    assert_eq!(report.categories.len(), 2);
    let voice = &report.categories[1];
    assert_eq!(voice.category_name, "Voice");
    assert_eq!(voice.score, 0);
    assert_eq!(voice.max_score, 10);
    assert!(voice.standards.is_empty());
    assert_eq!(report.total_score, 2);
    assert_eq!(report.deduct_points, 13);
}

#[tokio::test]
async fn fan_out_missing_completion_content_becomes_placeholder() {
    let fake = Arc::new(
        FakeClient::new()
            .reply_when("following category: Clarity", clarity_output().to_string())
            .fail_when(
                "following category: Voice",
                CritiqueError::malformed("chat completion response missing content"),
            ),
    );
    let ev = Evaluator::new(
        rubrics(vec![
            category("Clarity", &["Specificity"]),
            category("Voice", &["Tone"]),
        ]),
        fake,
        &config(Strategy::FanOut),
    )
    .unwrap();

    let report = ev.evaluate(&essay()).await.unwrap();
    assert_eq!(report.categories[1].score, 0);
    assert_eq!(report.total_score + report.deduct_points, 10);
}

#[tokio::test]
async fn fan_out_transport_failure_fails_request() {
    let fake = Arc::new(
        FakeClient::new()
            .reply_when("following category: Clarity", clarity_output().to_string())
            .fail_when(
                "following category: Voice",
                CritiqueError::transport(Some(503), "upstream unavailable"),
            ),
    );
    let ev = Evaluator::new(
        rubrics(vec![
            category("Clarity", &["Specificity"]),
            category("Voice", &["Tone"]),
        ]),
        fake,
        &config(Strategy::FanOut),
    )
    .unwrap();

    let err = ev.evaluate(&essay()).await.expect_err("transport is fatal");
    assert_eq!(err.kind(), "transport");
    assert_eq!(err.category.as_deref(), Some("Voice"));
    assert!(err.cause.is_retryable());
}

fn slow_siblings_one_fast_failure() -> Arc<FakeClient> {
    Arc::new(
        FakeClient::new()
            .with_default(clarity_output().to_string())
            .fail_fast_when(
                "following category: Voice",
                CritiqueError::transport(Some(502), "bad gateway"),
            )
            .with_delay(Duration::from_millis(300)),
    )
}

fn three_categories() -> Arc<RubricSet> {
    rubrics(vec![
        category("Clarity", &["Specificity"]),
        category("Voice", &["Tone"]),
        category("Structure", &["Flow"]),
    ])
}

#[tokio::test]
async fn fan_out_failure_abandons_in_flight_siblings() {
    let fake = slow_siblings_one_fast_failure();
    let ev = Evaluator::new(three_categories(), fake.clone(), &config(Strategy::FanOut)).unwrap();

    let started = std::time::Instant::now();
    let err = ev.evaluate(&essay()).await.expect_err("transport is fatal");
    assert_eq!(err.category.as_deref(), Some("Voice"));
    assert!(started.elapsed() < Duration::from_millis(300));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fake.call_count(), 3);
    assert_eq!(fake.completed_count(), 1, "slow siblings must not run to completion");
}

#[tokio::test]
async fn dropping_the_evaluation_cancels_outstanding_calls() {
    let fake = Arc::new(
        FakeClient::new()
            .with_default(clarity_output().to_string())
            .with_delay(Duration::from_millis(300)),
    );
    let ev = Evaluator::new(three_categories(), fake.clone(), &config(Strategy::FanOut)).unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(50), ev.evaluate(&essay())).await;
    assert!(outcome.is_err(), "evaluation should still be waiting");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fake.call_count(), 3);
    assert_eq!(fake.completed_count(), 0);
}

#[tokio::test]
async fn fan_out_keeps_corpus_order_and_bounds_concurrency() {
    let keys = ["A", "B", "C", "D", "E"];
    let reply = json!({"categoryName": "any", "score": 5, "maxScore": 5, "standards": []});
    let fake = Arc::new(
        FakeClient::new()
            .with_default(reply.to_string())
            .with_delay(Duration::from_millis(20)),
    );
    let cfg = ServiceConfig {
        concurrency: 2,
        ..config(Strategy::FanOut)
    };
    let ev = Evaluator::new(
        rubrics(keys.iter().map(|k| category(k, &["Item"])).collect()),
        fake.clone(),
        &cfg,
    )
    .unwrap();

    let report = ev.evaluate(&essay()).await.unwrap();
    let names: Vec<_> = report
        .categories
        .iter()
        .map(|c| c.category_name.as_str())
        .collect();
    assert_eq!(names, keys);
    assert_eq!(fake.call_count(), 5);
    assert_eq!(fake.peak_concurrency(), 2);
    assert_eq!(report.total_score, 25);
    assert_eq!(report.deduct_points, 0);
}

#[tokio::test]
async fn combined_passes_summary_and_recomputes_totals() {
    let mut voice = clarity_output();
    voice["categoryName"] = json!("Voice");
    voice["standards"][0]["standardName"] = json!("Tone");
    voice["score"] = json!(7);
    let reply = json!({
        "totalScore": 99,
        "deductPoints": 1,
        "overallSummary": "Claims lack concrete support.",
        "categories": [clarity_output(), voice]
    });
    let fake = Arc::new(FakeClient::new().with_default(reply.to_string()));
    let ev = Evaluator::new(
        rubrics(vec![
            category("Clarity", &["Specificity"]),
            category("Voice", &["Tone", "Detail"]),
        ]),
        fake.clone(),
        &config(Strategy::Combined),
    )
    .unwrap();

    let report = ev.evaluate(&essay()).await.unwrap();
    assert_eq!(fake.call_count(), 1);
    assert_eq!(report.overall_summary, "Claims lack concrete support.");
    assert_eq!(report.total_score, 9);
    assert_eq!(report.deduct_points, 6);

    let req = &fake.requests()[0];
    assert_eq!(req.unit, "combined");
    assert!(req.user.contains("ALL of the following categories: Clarity, Voice"));
    assert_eq!(
        req.response_format.as_ref().unwrap()["json_schema"]["name"],
        "essay_evaluation"
    );
}

#[tokio::test]
async fn combined_malformed_output_is_fatal() {
    let fake = Arc::new(FakeClient::new().with_default("{\"totalScore\": 3, \"categories\": ["));
    let ev = Evaluator::new(
        rubrics(vec![category("Clarity", &["Specificity"])]),
        fake,
        &config(Strategy::Combined),
    )
    .unwrap();

    let err = ev.evaluate(&essay()).await.expect_err("no partial report");
    assert_eq!(err.kind(), "malformed_output");
    assert!(err.category.is_none());
}

#[tokio::test]
async fn fixed_total_possible_is_used_for_deduction() {
    let fake = Arc::new(FakeClient::new().with_default(clarity_output().to_string()));
    let cfg = ServiceConfig {
        total_possible: Some(90),
        ..config(Strategy::FanOut)
    };
    let ev = Evaluator::new(
        rubrics(vec![category("Clarity", &["Specificity"])]),
        fake,
        &cfg,
    )
    .unwrap();
    assert_eq!(ev.total_possible(), 90);

    let report = ev.evaluate(&essay()).await.unwrap();
    assert_eq!(report.total_score, 2);
    assert_eq!(report.deduct_points, 88);
}

#[test]
fn fixed_total_below_corpus_maximum_is_rejected() {
    let cfg = ServiceConfig {
        total_possible: Some(4),
        ..config(Strategy::FanOut)
    };
    let err = Evaluator::new(
        rubrics(vec![category("Clarity", &["Specificity"])]),
        Arc::new(FakeClient::new()),
        &cfg,
    )
    .err()
    .expect("total below maximum");
    assert_eq!(err.kind(), "config");
}
