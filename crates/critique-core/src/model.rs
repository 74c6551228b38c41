use crate::errors::CritiqueError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Points available per rubric standard.
pub const STANDARD_MAX_SCORE: u32 = 5;

/// One scoring standard. Level anchors are opaque text and are forwarded to the model verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    pub name: String,
    #[serde(flatten)]
    pub anchors: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RubricCategory {
    pub key: String,
    pub category: String,
    pub items: Vec<RubricItem>,
}

impl RubricCategory {
    pub fn max_score(&self) -> u32 {
        STANDARD_MAX_SCORE * self.items.len() as u32
    }

    pub fn has_item(&self, name: &str) -> bool {
        self.items.iter().any(|i| i.name == name)
    }
}

/// Essay text. Never printed by `Debug`; the text is private user data.
#[derive(Clone, PartialEq, Eq)]
pub struct Essay(String);

impl Essay {
    pub fn new(text: impl Into<String>) -> Result<Self, CritiqueError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CritiqueError::invalid_input("essay must not be empty"));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl std::fmt::Debug for Essay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Essay")
            .field("chars", &self.char_count())
            .field("digest", &crate::redaction::digest(&self.0))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub original: String,
    pub issue: String,
    pub suggestion: String,
    pub reason: String,
    pub comparison: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardResult {
    pub standard_name: String,
    #[serde(deserialize_with = "whole_number")]
    pub score: u32,
    #[serde(deserialize_with = "whole_number")]
    pub max_score: u32,
    pub problem: String,
    pub examples: Vec<Example>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResult {
    pub category_name: String,
    #[serde(deserialize_with = "whole_number")]
    pub score: u32,
    #[serde(deserialize_with = "whole_number")]
    pub max_score: u32,
    pub standards: Vec<StandardResult>,
}

impl CategoryResult {
    /// Zero-score stand-in used when a category's model output is unusable.
    pub fn placeholder(rubric: &RubricCategory) -> Self {
        Self {
            category_name: rubric.category.clone(),
            score: 0,
            max_score: rubric.max_score(),
            standards: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    #[serde(deserialize_with = "whole_number")]
    pub total_score: u32,
    #[serde(deserialize_with = "whole_number")]
    pub deduct_points: u32,
    pub overall_summary: String,
    pub categories: Vec<CategoryResult>,
}

/// Accepts `3` and `3.0`; rejects negatives and fractions.
fn whole_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    let n = match &value {
        Value::Number(n) => n,
        other => return Err(D::Error::custom(format!("expected number, got {}", other))),
    };
    if let Some(u) = n.as_u64() {
        return u32::try_from(u).map_err(|_| D::Error::custom(format!("{} out of range", u)));
    }
    match n.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) => Ok(f as u32),
        _ => Err(D::Error::custom(format!(
            "expected non-negative whole number, got {}",
            n
        ))),
    }
}
