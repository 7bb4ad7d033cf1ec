use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    Json,
};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::scoring::bulk::{read_archive, score_archive, ArchiveLimits, BulkError, BulkReport};
use crate::scoring::extract::ResumeDocument;
use crate::scoring::pipeline::{ScoreRequest, ScoringResponse, UNKNOWN_CANDIDATE};
use crate::state::AppState;

const MISSING_FILE: &str = "No resume file uploaded. Use the 'file' key in multipart/form-data.";

/// Fields of a scoring upload. Unknown fields are ignored.
#[derive(Default)]
struct ScoreForm {
    name: Option<String>,
    candidate_email: Option<String>,
    file: Option<ResumeDocument>,
}

async fn read_form(mut multipart: Multipart) -> Result<ScoreForm, AppError> {
    let mut form = ScoreForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                form.file = Some(ResumeDocument::new(bytes, file_name));
            }
            Some("name") => {
                let name = field.text().await.map_err(bad_multipart)?;
                form.name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
            }
            Some("candidate_email") => {
                let email = field.text().await.map_err(bad_multipart)?;
                form.candidate_email = Some(email.trim().to_string()).filter(|e| !e.is_empty());
            }
            _ => {}
        }
    }
    Ok(form)
}

fn bad_multipart(e: MultipartError) -> AppError {
    AppError::Validation(format!("Malformed multipart body: {e}"))
}

/// POST /api/v1/score
pub async fn handle_score(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ScoringResponse>, AppError> {
    let span = info_span!("score", request_id = %Uuid::new_v4());
    async move {
        let form = read_form(multipart).await?;
        let document = form
            .file
            .ok_or_else(|| AppError::Validation(MISSING_FILE.to_string()))?;
        let name = form.name.unwrap_or_else(|| UNKNOWN_CANDIDATE.to_string());
        info!(
            "Scoring resume for '{name}' ({} bytes, {:?})",
            document.bytes.len(),
            document.media_type
        );

        let response = state
            .pipeline
            .score(ScoreRequest {
                document,
                name,
                candidate_email: form.candidate_email,
            })
            .await?;
        Ok(Json(response))
    }
    .instrument(span)
    .await
}

/// POST /api/v1/score/bulk
pub async fn handle_bulk_score(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BulkReport>, AppError> {
    let span = info_span!("bulk_score", request_id = %Uuid::new_v4());
    async move {
        let form = read_form(multipart).await?;
        let archive = form
            .file
            .ok_or_else(|| AppError::Validation(MISSING_FILE.to_string()))?;

        let limits = ArchiveLimits::for_upload(state.config.max_upload_bytes);
        let entries = read_archive(&archive.bytes, limits).map_err(|e| match e {
            BulkError::Archive(_) => AppError::Validation(e.to_string()),
            BulkError::Empty => AppError::UnprocessableEntity(e.to_string()),
        })?;
        info!("Bulk archive holds {} resumes", entries.len());

        Ok(Json(score_archive(&state.pipeline, entries).await))
    }
    .instrument(span)
    .await
}
