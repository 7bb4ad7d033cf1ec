use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::mail::{rejection_letter, REJECTION_SUBJECT};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RejectionMailRequest {
    pub to: String,
    pub suggestions: String,
}

#[derive(Debug, Serialize)]
pub struct RejectionMailResponse {
    pub status: &'static str,
    pub to: String,
}

/// POST /api/v1/mail/rejection
pub async fn handle_send_rejection(
    State(state): State<AppState>,
    Json(req): Json<RejectionMailRequest>,
) -> Result<Json<RejectionMailResponse>, AppError> {
    let to = req.to.trim().to_string();
    if to.is_empty() {
        return Err(AppError::Validation("Recipient address is required.".to_string()));
    }
    let mailer = state
        .mailer
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Mail relay is not configured.".to_string()))?;

    mailer
        .send(&to, REJECTION_SUBJECT, &rejection_letter(&req.suggestions))
        .await?;
    info!("Rejection mail sent to {to}");

    Ok(Json(RejectionMailResponse { status: "sent", to }))
}
