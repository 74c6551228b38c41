//! Boundary between free-text model output and the typed pipeline.
//!
//! Two policies, chosen by the caller:
//! - isolated category: [`category_or_placeholder`] never fails; unusable output
//!   becomes a zero-score placeholder for that category only.
//! - combined report: [`parse_report`] returns `MalformedOutput` and the request fails.

use crate::errors::CritiqueError;
use crate::model::{CategoryResult, EvaluationReport, RubricCategory, STANDARD_MAX_SCORE};
use crate::redaction;
use crate::rubric::RubricSet;
use crate::schema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// First JSON value in `raw`, tolerating code fences and leading prose.
pub fn extract_json(raw: &str) -> Result<Value, CritiqueError> {
    let text = raw.trim();
    let start = text
        .find('{')
        .ok_or_else(|| CritiqueError::malformed("no JSON object found in model output"))?;

    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| CritiqueError::malformed("no JSON object found in model output"))?
        .map_err(|e| CritiqueError::malformed(format!("invalid JSON: {}", e)))
}

/// Strict parse of one category evaluated in isolation.
pub fn parse_category(raw: &str, rubric: &RubricCategory) -> Result<CategoryResult, CritiqueError> {
    let value = extract_json(raw)?;
    let validator = schema::category_validator().map_err(CritiqueError::config)?;
    let result: CategoryResult = typed(validator, value)?;
    check_category(result, rubric)
}

/// Isolated-category policy: any malformed output yields the zero-score placeholder.
pub fn category_or_placeholder(raw: &str, rubric: &RubricCategory) -> CategoryResult {
    match parse_category(raw, rubric) {
        Ok(result) => result,
        Err(err) => {
            debug!(
                category = %rubric.key,
                output_digest = %redaction::digest(raw),
                output_chars = raw.chars().count(),
                "unusable category output"
            );
            placeholder(rubric, &err)
        }
    }
}

/// Placeholder for `rubric`, logging why the model result was discarded.
pub fn placeholder(rubric: &RubricCategory, reason: &CritiqueError) -> CategoryResult {
    warn!(
        category = %rubric.key,
        error.kind = reason.kind(),
        error = %reason,
        "category output discarded; substituting zero-score placeholder"
    );
    CategoryResult::placeholder(rubric)
}

/// Strict parse of a combined report. Categories come back in corpus order,
/// matched to the rubric by display name. Totals are the model's own and are
/// not trusted; callers re-aggregate.
pub fn parse_report(raw: &str, rubrics: &RubricSet) -> Result<EvaluationReport, CritiqueError> {
    let value = extract_json(raw)?;
    let validator = schema::report_validator().map_err(CritiqueError::config)?;
    let mut report: EvaluationReport = typed(validator, value)?;

    let mut by_key: Vec<Option<CategoryResult>> = vec![None; rubrics.len()];
    for result in std::mem::take(&mut report.categories) {
        let rubric = rubrics.find_by_name(&result.category_name).ok_or_else(|| {
            CritiqueError::malformed(format!(
                "unknown category '{}' in report",
                result.category_name
            ))
        })?;
        let idx = rubrics
            .categories()
            .iter()
            .position(|c| c.key == rubric.key)
            .ok_or_else(|| CritiqueError::malformed("category index lookup failed"))?;
        if by_key[idx].is_some() {
            return Err(CritiqueError::malformed(format!(
                "category '{}' appears more than once",
                rubric.category
            )));
        }
        by_key[idx] = Some(check_category(result, rubric)?);
    }

    let missing: Vec<&str> = rubrics
        .categories()
        .iter()
        .zip(&by_key)
        .filter(|(_, r)| r.is_none())
        .map(|(c, _)| c.category.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(CritiqueError::malformed(format!(
            "report is missing categories: {}",
            missing.join(", ")
        )));
    }

    report.categories = by_key.into_iter().flatten().collect();
    Ok(report)
}

fn typed<T: DeserializeOwned>(
    validator: &jsonschema::Validator,
    value: Value,
) -> Result<T, CritiqueError> {
    let errors = schema::violations(validator, &value);
    if !errors.is_empty() {
        return Err(CritiqueError::malformed(format!(
            "schema violation: {}",
            errors.join("; ")
        )));
    }
    serde_json::from_value(value)
        .map_err(|e| CritiqueError::malformed(format!("unexpected field value: {}", e)))
}

fn check_category(
    mut result: CategoryResult,
    rubric: &RubricCategory,
) -> Result<CategoryResult, CritiqueError> {
    for standard in &result.standards {
        if standard.max_score != STANDARD_MAX_SCORE {
            return Err(CritiqueError::malformed(format!(
                "standard '{}' has maxScore {}, expected {}",
                standard.standard_name, standard.max_score, STANDARD_MAX_SCORE
            )));
        }
        if standard.score > STANDARD_MAX_SCORE {
            return Err(CritiqueError::malformed(format!(
                "standard '{}' score {} exceeds {}",
                standard.standard_name, standard.score, STANDARD_MAX_SCORE
            )));
        }
        if !rubric.has_item(&standard.standard_name) {
            warn!(category = %rubric.key, standard = %standard.standard_name, "standard not in rubric");
        }
    }

    let expected_max = rubric.max_score();
    if result.max_score != expected_max {
        warn!(
            category = %rubric.key,
            reported = result.max_score,
            expected = expected_max,
            "category maxScore disagrees with rubric; using rubric value"
        );
        result.max_score = expected_max;
    }
    if result.score > result.max_score {
        return Err(CritiqueError::malformed(format!(
            "category '{}' score {} exceeds maxScore {}",
            rubric.category, result.score, result.max_score
        )));
    }

    let expected = expected_subtotal(&result, rubric);
    if result.score != expected {
        warn!(
            category = %rubric.key,
            reported = result.score,
            expected,
            "category score does not match its standards"
        );
    }

    result.category_name = rubric.category.clone();
    Ok(result)
}

/// Category score implied by its standards: listed rubric items at their
/// scores, omitted rubric items at full marks. Unknown and repeated names are ignored.
fn expected_subtotal(result: &CategoryResult, rubric: &RubricCategory) -> u32 {
    let mut seen = HashSet::new();
    let listed: u32 = result
        .standards
        .iter()
        .filter(|s| rubric.has_item(&s.standard_name))
        .filter(|s| seen.insert(s.standard_name.as_str()))
        .map(|s| s.score)
        .sum();
    let omitted = rubric.items.len().saturating_sub(seen.len()) as u32;
    listed + STANDARD_MAX_SCORE * omitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RubricItem;
    use serde_json::{json, Map};

    fn category(key: &str, items: &[&str]) -> RubricCategory {
        RubricCategory {
            key: key.into(),
            category: key.into(),
            items: items
                .iter()
                .map(|n| RubricItem {
                    name: n.to_string(),
                    anchors: Map::new(),
                })
                .collect(),
        }
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

    #[test]
    fn parses_clarity_example() {
        let rubric = category("Clarity", &["Specificity"]);
        let result = parse_category(&clarity_output().to_string(), &rubric).unwrap();
        assert_eq!(result.score, 2);
        assert_eq!(result.max_score, 5);
        assert_eq!(result.standards[0].examples[0].original, "I love science.");
    }

    #[test]
    fn extracts_json_from_fences_and_prose() {
        let raw = format!("Here you go:\n```json\n{}\n```", clarity_output());
        assert_eq!(extract_json(&raw).unwrap(), clarity_output());
        assert!(matches!(
            extract_json("no json here"),
            Err(CritiqueError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_and_extra_fields() {
        let rubric = category("Clarity", &["Specificity"]);

        let mut v = clarity_output();
        v["standards"][0]["score"] = json!(7);
        assert!(parse_category(&v.to_string(), &rubric).is_err());

        let mut v = clarity_output();
        v["standards"][0]["maxScore"] = json!(10);
        assert!(parse_category(&v.to_string(), &rubric).is_err());

        let mut v = clarity_output();
        v["score"] = json!(9);
        assert!(parse_category(&v.to_string(), &rubric).is_err());

        let mut v = clarity_output();
        v["strengths"] = json!("great essay");
        assert!(parse_category(&v.to_string(), &rubric).is_err());

        let mut v = clarity_output();
        v["score"] = json!("two");
        assert!(parse_category(&v.to_string(), &rubric).is_err());
    }

    #[test]
    fn category_max_score_is_normalised_to_rubric() {
        let rubric = category("Clarity", &["Specificity", "Voice"]);
        let mut v = clarity_output();
        v["score"] = json!(7);
        let result = parse_category(&v.to_string(), &rubric).unwrap();
        assert_eq!(result.max_score, 10);
        assert_eq!(result.score, 7);
    }

    #[test]
    fn expected_subtotal_ignores_standards_outside_the_rubric() {
        let rubric = category("Clarity", &["Specificity", "Voice"]);
        let mut v = clarity_output();
        v["score"] = json!(4);
        v["standards"][0]["score"] = json!(3);
        let mut stray = v["standards"][0].clone();
        stray["standardName"] = json!("Grammar");
        stray["score"] = json!(1);
        v["standards"].as_array_mut().unwrap().push(stray);

        let result: CategoryResult = serde_json::from_value(v).unwrap();
        // Specificity 3 + Voice omitted at full marks.
        assert_eq!(expected_subtotal(&result, &rubric), 8);

        let mut repeated = result.clone();
        repeated.standards[1].standard_name = "Specificity".into();
        assert_eq!(expected_subtotal(&repeated, &rubric), 8);
    }

    #[test]
    fn malformed_output_yields_placeholder() {
        let rubric = category("Clarity", &["Specificity", "Voice"]);
        for raw in ["", "not json", "{\"categoryName\": \"Clarity\"", "{\"score\": 1}"] {
            let result = category_or_placeholder(raw, &rubric);
            assert_eq!(result, CategoryResult::placeholder(&rubric), "{raw:?}");
        }
    }

    #[test]
    fn report_categories_are_matched_and_reordered() {
        let set = RubricSet::from_categories(
            vec![category("Clarity", &["Specificity"]), category("Voice", &["Tone"])],
            None,
        )
        .unwrap();
        let mut voice = clarity_output();
        voice["categoryName"] = json!("Voice");
        voice["standards"][0]["standardName"] = json!("Tone");
        let raw = json!({
            "totalScore": 4,
            "deductPoints": 6,
            "overallSummary": "Vague throughout.",
            "categories": [voice, clarity_output()]
        })
        .to_string();

        let report = parse_report(&raw, &set).unwrap();
        let names: Vec<_> = report
            .categories
            .iter()
            .map(|c| c.category_name.as_str())
            .collect();
        assert_eq!(names, ["Clarity", "Voice"]);
        assert_eq!(report.overall_summary, "Vague throughout.");
    }

    #[test]
    fn report_with_missing_unknown_or_duplicate_category_is_malformed() {
        let set = RubricSet::from_categories(
            vec![category("Clarity", &["Specificity"]), category("Voice", &["Tone"])],
            None,
        )
        .unwrap();
        let report = |cats: Vec<Value>| {
            json!({"totalScore": 0, "deductPoints": 0, "overallSummary": "", "categories": cats})
                .to_string()
        };
        let mut unknown = clarity_output();
        unknown["categoryName"] = json!("Grammar");

        for raw in [
            report(vec![clarity_output()]),
            report(vec![clarity_output(), unknown]),
            report(vec![clarity_output(), clarity_output()]),
            "{\"totalScore\": 1".to_string(),
        ] {
            assert!(matches!(
                parse_report(&raw, &set),
                Err(CritiqueError::MalformedOutput { .. })
            ));
        }
    }
}
