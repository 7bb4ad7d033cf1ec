mod config;
mod crm;
mod errors;
mod explain;
mod mail;
mod model;
mod report;
mod routes;
mod scoring;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::crm::SalesforceClient;
use crate::explain::LimeTextExplainer;
use crate::mail::{Mailer, SmtpMailer};
use crate::model::HiringModel;
use crate::report::CsvReportSink;
use crate::routes::build_router;
use crate::scoring::pipeline::{ScoringPipeline, ScoringSettings};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hiring API v{}", env!("CARGO_PKG_VERSION"));

    // Load model artifacts; the service cannot score without them
    let model = HiringModel::load(&config.model_path, &config.vectorizer_path).map_err(|e| {
        error!("Error loading model: {e}");
        e
    })?;

    // Initialize record store (Salesforce)
    let records = SalesforceClient::new(config.salesforce.clone())?;
    info!(
        "Salesforce client initialized (object: {})",
        config.salesforce.object
    );

    // Initialize report sink
    let reports = CsvReportSink::new(&config.report_path);
    info!("Report sink: {}", reports.path().display());

    // Initialize mailer (optional)
    let mailer: Option<Arc<dyn Mailer>> = match config.mail.clone() {
        Some(settings) => {
            let host = settings.host.clone();
            let mailer = SmtpMailer::new(settings)?;
            info!("SMTP mailer initialized ({host})");
            Some(Arc::new(mailer))
        }
        None => {
            warn!("MAIL_USERNAME/MAIL_PASSWORD not set; rejection mail disabled");
            None
        }
    };

    let explainer = LimeTextExplainer::new(config.explainer.clone());
    info!(
        "Explainer: {} samples, {} features, seed {}, {} workers",
        config.explainer.num_samples,
        config.explainer.num_features,
        config.explainer.seed,
        config.explainer.workers
    );

    let pipeline = ScoringPipeline::new(
        Arc::new(model),
        Arc::new(explainer),
        Arc::new(records),
        Arc::new(reports),
        ScoringSettings {
            num_features: config.explainer.num_features,
            low_confidence_threshold: config.low_confidence_threshold,
        },
    )
    .with_mailer(mailer.clone());

    // Build app state
    let state = AppState {
        config: config.clone(),
        pipeline: Arc::new(pipeline),
        mailer,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
