use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use critique_core::{CritiqueError, Essay, EvaluationError};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub essay: String,
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn rejection_response(rejection: JsonRejection) -> Response {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
    }
    error_response(
        StatusCode::BAD_REQUEST,
        &format!("invalid request body: {}", rejection.body_text()),
    )
}

/// Pipeline failures keep the cause kind but never its message: transport
/// bodies stay in the logs.
fn evaluation_error_response(err: &EvaluationError) -> Response {
    let status = match err.cause {
        CritiqueError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "error": "evaluation failed", "kind": err.kind() })),
    )
        .into_response()
}

pub async fn evaluate_handler(
    State(state): State<AppState>,
    body: Result<Json<EvaluateRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(status = rejection.status().as_u16(), "rejected evaluate request body");
            return rejection_response(rejection);
        }
    };
    let essay = match Essay::new(req.essay) {
        Ok(essay) => essay,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match state.evaluator.evaluate(&essay).await {
        Ok(report) => {
            info!(total_score = report.total_score, "evaluate request served");
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => evaluation_error_response(&e),
    }
}

pub async fn healthz_handler(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "categories": state.evaluator.rubrics().len(),
        "strategy": state.evaluator.strategy().to_string(),
    }))
    .into_response()
}

pub async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "only POST is supported")
}

pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not found")
}
