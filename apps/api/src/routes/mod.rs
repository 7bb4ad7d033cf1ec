pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::mail::handlers as mail;
use crate::scoring::handlers as scoring;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health::health_handler))
        // Scoring API
        .route("/api/v1/score", post(scoring::handle_score))
        .route("/api/v1/score/bulk", post(scoring::handle_bulk_score))
        // Mail API
        .route("/api/v1/mail/rejection", post(mail::handle_send_rejection))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}
