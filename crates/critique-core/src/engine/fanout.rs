use super::Evaluator;
use crate::aggregate::FAN_OUT_SUMMARY;
use crate::errors::{CritiqueError, EvaluationError};
use crate::model::{CategoryResult, Essay, EvaluationReport};
use crate::validate;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// One call per category, at most `concurrency` in flight. Malformed output
/// degrades that category to a placeholder; any other failure aborts the
/// remaining calls and fails the request.
pub(super) async fn evaluate(
    ev: &Evaluator,
    essay: &Essay,
) -> Result<EvaluationReport, EvaluationError> {
    let sem = Arc::new(Semaphore::new(ev.concurrency));
    let mut join_set = JoinSet::new();

    for (idx, rubric) in ev.rubrics.categories().iter().enumerate() {
        let request = ev.category_request(rubric, essay);
        let sem = sem.clone();
        let client = ev.client.clone();
        let rubrics = ev.rubrics.clone();

        join_set.spawn(
            async move {
                let rubric = &rubrics.categories()[idx];
                let _permit = sem.acquire_owned().await.map_err(|e| {
                    EvaluationError::in_category(&rubric.key, CritiqueError::internal(e.to_string()))
                })?;

                let result = match client.complete(&request).await {
                    Ok(resp) => validate::category_or_placeholder(&resp.text, rubric),
                    Err(e @ CritiqueError::MalformedOutput { .. }) => {
                        validate::placeholder(rubric, &e)
                    }
                    Err(e) => return Err(EvaluationError::in_category(&rubric.key, e)),
                };
                Ok::<_, EvaluationError>((idx, result))
            }
            .in_current_span(),
        );
    }

    let mut slots: Vec<Option<CategoryResult>> = vec![None; ev.rubrics.len()];
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok((idx, result))) => slots[idx] = Some(result),
            Ok(Err(e)) => {
                join_set.abort_all();
                return Err(e);
            }
            Err(e) => {
                join_set.abort_all();
                return Err(EvaluationError::new(CritiqueError::internal(format!(
                    "category task failed: {}",
                    e
                ))));
            }
        }
    }

    let categories = slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| CritiqueError::internal("category result missing after join"))?;
    Ok(ev.aggregator.aggregate(categories, FAN_OUT_SUMMARY))
}
