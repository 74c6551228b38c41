//! HTTP surface for the essay evaluator.
//!
//! `POST /evaluate` (alias `/api/evaluate`) takes `{"essay": string}` and returns
//! the evaluation report. Every error response is a JSON object with an `error` key.

pub mod exit_codes;
pub mod http;
pub mod logging;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use critique_core::Evaluator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<Evaluator>,
}

impl AppState {
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self { evaluator }
    }
}

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let evaluate = post(http::evaluate_handler).fallback(http::method_not_allowed);
    Router::new()
        .route("/evaluate", evaluate.clone())
        .route("/api/evaluate", evaluate)
        .route("/healthz", get(http::healthz_handler))
        .fallback(http::not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
