use crate::errors::CritiqueError;
use crate::model::{CategoryResult, EvaluationReport};
use crate::rubric::RubricSet;

/// Summary used when categories were scored independently and no model wrote one.
pub const FAN_OUT_SUMMARY: &str = "Overall evaluation complete.";

/// Where the report's total possible score comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TotalPossible {
    /// Σ category maxScore of the loaded corpus.
    #[default]
    Derived,
    Fixed(u32),
}

impl TotalPossible {
    /// Configured value, else the corpus-declared total, else derived.
    pub fn from_config(configured: Option<u32>, rubrics: &RubricSet) -> Self {
        configured
            .or(rubrics.declared_total())
            .map_or(Self::Derived, Self::Fixed)
    }
}

/// Pure arithmetic over category results. Never looks inside standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreAggregator {
    total_possible: u32,
}

impl ScoreAggregator {
    /// Resolves the total once. A fixed total below the corpus maximum is rejected
    /// so that `deductPoints` can never go negative.
    pub fn new(total: TotalPossible, rubrics: &RubricSet) -> Result<Self, CritiqueError> {
        let derived = rubrics.derived_total();
        let total_possible = match total {
            TotalPossible::Derived => derived,
            TotalPossible::Fixed(0) => {
                return Err(CritiqueError::config("total possible score must be positive"))
            }
            TotalPossible::Fixed(n) if n < derived => {
                return Err(CritiqueError::config(format!(
                    "total possible score {} is below the rubric maximum {}",
                    n, derived
                )))
            }
            TotalPossible::Fixed(n) => n,
        };
        Ok(Self { total_possible })
    }

    pub fn total_possible(&self) -> u32 {
        self.total_possible
    }

    pub fn aggregate(
        &self,
        categories: Vec<CategoryResult>,
        overall_summary: impl Into<String>,
    ) -> EvaluationReport {
        let total_score: u32 = categories.iter().map(|c| c.score).sum();
        EvaluationReport {
            total_score,
            deduct_points: self.total_possible.saturating_sub(total_score),
            overall_summary: overall_summary.into(),
            categories,
        }
    }
}
