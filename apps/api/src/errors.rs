use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::mail::MailError;
use crate::scoring::pipeline::ScoringError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Scoring(e) => scoring_response(e),
            AppError::Mail(e @ MailError::Address { .. }) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Mail(e) => {
                tracing::error!("Mail error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "MAIL_ERROR",
                    format!("Could not send mail: {e}"),
                )
            }
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg.clone())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code
        }));

        (status, body).into_response()
    }
}

fn scoring_response(e: &ScoringError) -> (StatusCode, &'static str, String) {
    match e {
        ScoringError::EmptyInput { .. } => (StatusCode::BAD_REQUEST, "EMPTY_INPUT", e.to_string()),
        ScoringError::Extraction(_) => {
            (StatusCode::BAD_REQUEST, "EXTRACTION_ERROR", e.to_string())
        }
        ScoringError::PersistenceRejected { .. } | ScoringError::Persistence(_) => {
            tracing::error!("Persistence error at {:?}: {e}", e.stage());
            (
                StatusCode::BAD_GATEWAY,
                "PERSISTENCE_ERROR",
                format!("Salesforce error: {e}"),
            )
        }
        ScoringError::Prediction(_) | ScoringError::Task { .. } => {
            tracing::error!("Scoring error at {:?}: {e}", e.stage());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SCORING_ERROR",
                "An internal error occurred while scoring the resume".to_string(),
            )
        }
    }
}
