//! Resume Scoring: orchestrates the full scoring pipeline for one resume.
//!
//! Flow: extract → normalize → vectorize + predict → explain → format →
//!       persist to record store → append report row → (optional) rejection mail.
//!
//! Everything before a prediction exists aborts the request. Everything after
//! degrades: a decision and probability are always returned once predicted, except
//! when the record store refuses the candidate.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crm::{CandidateRecord, CrmError, RecordStore};
use crate::explain::formatter::failure_text;
use crate::explain::{ExplanationOutcome, LimeTextExplainer};
use crate::mail::{rejection_letter, Mailer, REJECTION_SUBJECT};
use crate::model::{Decision, HiringModel, ModelError, PredictionResult};
use crate::report::{ReportRow, ReportSink};
use crate::scoring::extract::{extract, ExtractionError, ResumeDocument};
use crate::scoring::normalize::{normalize, NormalizedText};

/// Below this P(Hire), a failed explanation is reported as a domain mismatch.
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 0.2;

pub const DOMAIN_MISMATCH_MESSAGE: &str = "DOMAIN MISMATCH: Prediction rejected due to lack of \
     core keywords (e.g., Python, AWS, ML). Resume appears highly specialized in non-technical \
     engineering fields.";

pub const UNKNOWN_CANDIDATE: &str = "Unknown Candidate";

/// Pipeline stages, in order. Errors carry the stage they occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Received,
    Extracting,
    Normalizing,
    Predicting,
    Explaining,
    Formatting,
    Persisting,
    Completed,
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Resume file is empty or text extraction failed.")]
    EmptyInput { stage: Stage },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Prediction failed: {0}")]
    Prediction(#[from] ModelError),

    #[error("Record store rejected the candidate: {}", .errors.join("; "))]
    PersistenceRejected { errors: Vec<String> },

    #[error("Record store unavailable: {0}")]
    Persistence(#[from] CrmError),

    #[error("{stage:?} task failed: {message}")]
    Task { stage: Stage, message: String },
}

impl ScoringError {
    pub fn stage(&self) -> Stage {
        match self {
            ScoringError::EmptyInput { stage } | ScoringError::Task { stage, .. } => *stage,
            ScoringError::Extraction(_) => Stage::Extracting,
            ScoringError::Prediction(_) => Stage::Predicting,
            ScoringError::PersistenceRejected { .. } | ScoringError::Persistence(_) => {
                Stage::Persisting
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub document: ResumeDocument,
    pub name: String,
    /// When present and the decision is `Reject`, a rejection letter is mailed.
    pub candidate_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringResponse {
    pub candidate: String,
    pub decision: Decision,
    /// Rounded to 4 decimals.
    pub probability: f64,
    pub explanation_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_mail_sent: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ScoringSettings {
    pub num_features: usize,
    pub low_confidence_threshold: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            num_features: 5,
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Composes the model, explainer and external collaborators. Built once at startup;
/// all fields are read-only and shared across requests.
pub struct ScoringPipeline {
    model: Arc<HiringModel>,
    explainer: Arc<LimeTextExplainer>,
    records: Arc<dyn RecordStore>,
    reports: Arc<dyn ReportSink>,
    mailer: Option<Arc<dyn Mailer>>,
    settings: ScoringSettings,
}

impl ScoringPipeline {
    pub fn new(
        model: Arc<HiringModel>,
        explainer: Arc<LimeTextExplainer>,
        records: Arc<dyn RecordStore>,
        reports: Arc<dyn ReportSink>,
        settings: ScoringSettings,
    ) -> Self {
        Self {
            model,
            explainer,
            records,
            reports,
            mailer: None,
            settings,
        }
    }

    pub fn with_mailer(mut self, mailer: Option<Arc<dyn Mailer>>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn model(&self) -> &HiringModel {
        &self.model
    }

    /// Scores one resume end to end.
    pub async fn score(&self, request: ScoreRequest) -> Result<ScoringResponse, ScoringError> {
        let result = self.run(request).await;
        match &result {
            Ok(_) => debug!("Stage: {:?}", Stage::Completed),
            Err(e) => warn!("Scoring failed at {:?}: {e}", e.stage()),
        }
        result
    }

    async fn run(&self, request: ScoreRequest) -> Result<ScoringResponse, ScoringError> {
        let ScoreRequest {
            document,
            name,
            candidate_email,
        } = request;
        debug!("Stage: {:?} ({} bytes)", Stage::Received, document.bytes.len());

        // Step 1: Extract
        debug!("Stage: {:?}", Stage::Extracting);
        let resume_text = tokio::task::spawn_blocking(move || extract(&document))
            .await
            .map_err(|e| ScoringError::Task {
                stage: Stage::Extracting,
                message: e.to_string(),
            })??;
        if resume_text.trim().is_empty() {
            return Err(ScoringError::EmptyInput {
                stage: Stage::Extracting,
            });
        }

        // Step 2: Normalize
        debug!("Stage: {:?}", Stage::Normalizing);
        let cleaned = normalize(&resume_text);
        if cleaned.is_empty() {
            return Err(ScoringError::EmptyInput {
                stage: Stage::Normalizing,
            });
        }

        // Step 3: Vectorize + predict
        debug!("Stage: {:?}", Stage::Predicting);
        let prediction = self.model.predict(cleaned.as_str())?;
        info!(
            "Prediction for '{name}': {} (p={:.4})",
            prediction.label, prediction.probability
        );

        // Step 4: Explain + format (never fatal)
        let outcome = self.explain(&cleaned, prediction.label).await;
        let explanation_text = self.explanation_text(&outcome, &prediction);

        // Step 5: Persist
        debug!("Stage: {:?}", Stage::Persisting);
        let record = CandidateRecord::new(
            &name,
            &resume_text,
            prediction.label,
            prediction.probability,
            &explanation_text,
        );
        let created = self.records.create(&record).await?;
        if !created.success {
            return Err(ScoringError::PersistenceRejected {
                errors: if created.errors.is_empty() {
                    vec!["Unknown record store error".to_string()]
                } else {
                    created.errors
                },
            });
        }
        let record_id = created
            .id
            .ok_or_else(|| ScoringError::PersistenceRejected {
                errors: vec!["record store returned no identifier".to_string()],
            })?;
        let probability = round4(prediction.probability);

        // Step 6: Report row (logged and swallowed on failure)
        let row = ReportRow {
            record_id: record_id.clone(),
            decision: prediction.label,
            probability,
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = self.reports.append(row).await {
            warn!("Could not write report row for {record_id}: {e}");
        }

        // Step 7: Rejection mail (optional)
        let rejection_mail_sent = self
            .send_rejection(
                prediction.label,
                candidate_email.as_deref(),
                &explanation_text,
            )
            .await;

        Ok(ScoringResponse {
            candidate: name,
            decision: prediction.label,
            probability,
            explanation_text,
            external_record_id: Some(record_id),
            rejection_mail_sent,
        })
    }

    /// Runs the explainer on a blocking thread against the decided class.
    async fn explain(&self, text: &NormalizedText, decision: Decision) -> ExplanationOutcome {
        debug!("Stage: {:?}", Stage::Explaining);
        let model = Arc::clone(&self.model);
        let explainer = Arc::clone(&self.explainer);
        let text = text.clone();
        let num_features = self.settings.num_features;
        let target = decision.class_index();

        let joined = tokio::task::spawn_blocking(move || {
            explainer.explain(&text, target, num_features, |s: &str| model.predict_proba(s))
        })
        .await;

        debug!("Stage: {:?}", Stage::Formatting);
        let outcome = match joined {
            Ok(result) => ExplanationOutcome::from_result(result),
            Err(e) => ExplanationOutcome::Degraded {
                reason: e.to_string(),
                text: failure_text(&e),
            },
        };
        if let ExplanationOutcome::Degraded { reason, .. } = &outcome {
            warn!("Explanation degraded: {reason}");
        }
        outcome
    }

    fn explanation_text(&self, outcome: &ExplanationOutcome, prediction: &PredictionResult) -> String {
        if outcome.is_degraded() && prediction.probability < self.settings.low_confidence_threshold
        {
            DOMAIN_MISMATCH_MESSAGE.to_string()
        } else {
            outcome.text().to_string()
        }
    }

    /// Returns `None` when no mail was due, otherwise whether it went out.
    async fn send_rejection(
        &self,
        decision: Decision,
        email: Option<&str>,
        suggestions: &str,
    ) -> Option<bool> {
        let email = email.map(str::trim).filter(|e| !e.is_empty())?;
        if decision != Decision::Reject {
            return None;
        }
        let Some(mailer) = &self.mailer else {
            warn!("Rejection mail requested for {email} but no mail relay is configured");
            return Some(false);
        };
        match mailer
            .send(email, REJECTION_SUBJECT, &rejection_letter(suggestions))
            .await
        {
            Ok(()) => Some(true),
            Err(e) => {
                warn!("Could not send rejection mail to {email}: {e}");
                Some(false)
            }
        }
    }
}

fn round4(p: f64) -> f64 {
    (p * 10_000.0).round() / 10_000.0
}
