use super::Evaluator;
use crate::errors::EvaluationError;
use crate::model::{Essay, EvaluationReport};
use crate::validate;
use tracing::warn;

/// Single schema-enforced call. Any failure, malformed output included, fails the request.
pub(super) async fn evaluate(
    ev: &Evaluator,
    essay: &Essay,
) -> Result<EvaluationReport, EvaluationError> {
    let request = ev.combined_request(essay);
    let resp = ev.client.complete(&request).await?;
    let EvaluationReport {
        total_score,
        deduct_points,
        overall_summary,
        categories,
    } = validate::parse_report(&resp.text, &ev.rubrics)?;

    let report = ev.aggregator.aggregate(categories, overall_summary);
    if total_score != report.total_score || deduct_points != report.deduct_points {
        warn!(
            reported_total = total_score,
            reported_deduct = deduct_points,
            total_score = report.total_score,
            deduct_points = report.deduct_points,
            "model totals disagree with category scores; using recomputed totals"
        );
    }
    Ok(report)
}
