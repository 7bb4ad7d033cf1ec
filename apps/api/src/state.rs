use std::sync::Arc;

use crate::config::Config;
use crate::mail::Mailer;
use crate::scoring::pipeline::ScoringPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Model, explainer and collaborators, loaded once at startup.
    pub pipeline: Arc<ScoringPipeline>,
    /// Absent when no SMTP credentials are configured.
    pub mailer: Option<Arc<dyn Mailer>>,
}
