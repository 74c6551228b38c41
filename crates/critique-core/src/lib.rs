//! Rubric-driven essay critique over an LLM chat-completions backend.
//!
//! The pipeline turns one essay into an [`EvaluationReport`]:
//!
//! 1. [`rubric::RubricSet`] is loaded once at startup and shared read-only.
//! 2. [`prompt`] renders one prompt per unit of work (a category, or the whole set).
//! 3. [`providers::llm::LlmClient`] sends the prompt with an optional strict schema.
//! 4. [`validate`] turns the raw completion into typed results or a `MalformedOutput`.
//! 5. [`aggregate::ScoreAggregator`] folds category results into the report.
//!
//! [`engine::Evaluator`] sequences the steps for either strategy.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `DEEPSEEK_API_KEY` | Bearer credential (name configurable via `llm.api_key_env`) |
//! | `CRITIQUE_RUBRICS` | Rubric directory or merged rubric file |
//! | `CRITIQUE_STRATEGY` | `fan_out` or `combined` |
//! | `CRITIQUE_TOTAL_POSSIBLE` | Fixed total score (default: derived from the corpus) |
//! | `CRITIQUE_LLM_BASE_URL` | Chat-completions base URL |
//! | `CRITIQUE_LLM_MODEL` | Model id |
//! | `CRITIQUE_LLM_OUTPUT_FORMAT` | `json_object` (default), `json_schema` or `none` |
//! | `CRITIQUE_LLM_NETWORK` | `loopback_only` refuses every non-local endpoint |

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod errors;
pub mod model;
pub mod prompt;
pub mod providers;
pub mod redaction;
pub mod rubric;
pub mod schema;
pub mod validate;

pub use aggregate::{ScoreAggregator, TotalPossible};
pub use config::{LlmConfig, OutputFormat, ServiceConfig, Strategy};
pub use engine::Evaluator;
pub use errors::{CritiqueError, EvaluationError};
pub use model::{
    CategoryResult, Essay, EvaluationReport, Example, RubricCategory, RubricItem, StandardResult,
};
pub use rubric::RubricSet;
