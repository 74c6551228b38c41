//! Error types for the evaluation pipeline.

/// Failures raised by a single pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CritiqueError {
    /// Missing credential or unusable configuration. Fatal; raised before any network call.
    #[error("config error: {message}")]
    Config { message: String },

    /// Remote call failed or returned a non-success status.
    #[error("transport error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Transport { status: Option<u16>, message: String },

    /// Model output could not be parsed or failed structural validation.
    #[error("malformed model output: {reason}")]
    MalformedOutput { reason: String },

    /// Caller supplied an unusable essay.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A worker task died (panic or cancellation) before reporting.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CritiqueError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable label for logs and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Transport { .. } => "transport",
            Self::MalformedOutput { .. } => "malformed_output",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether a caller-side retry can help. The gateway itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { status: None, .. } => true,
            Self::Transport {
                status: Some(status),
                ..
            } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CritiqueError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            format!("request timeout: {}", err)
        } else {
            err.to_string()
        };
        Self::Transport { status, message }
    }
}

/// Orchestrator-level failure wrapping the first unrecoverable step failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("evaluation failed{}: {cause}", .category.as_ref().map(|c| format!(" (category {c})")).unwrap_or_default())]
pub struct EvaluationError {
    /// Rubric key of the unit of work that failed, when the failure is category-scoped.
    pub category: Option<String>,
    #[source]
    pub cause: CritiqueError,
}

impl EvaluationError {
    pub fn new(cause: CritiqueError) -> Self {
        Self {
            category: None,
            cause,
        }
    }

    pub fn in_category(category: impl Into<String>, cause: CritiqueError) -> Self {
        Self {
            category: Some(category.into()),
            cause,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.cause.kind()
    }
}

impl From<CritiqueError> for EvaluationError {
    fn from(cause: CritiqueError) -> Self {
        Self::new(cause)
    }
}
