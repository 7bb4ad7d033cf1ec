use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version and the loaded model's shape.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let model = state.pipeline.model();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "hiring-api",
        "model": {
            "features": model.feature_count(),
            "classifier": model.classifier_kind()
        },
        "mail_enabled": state.mailer.is_some()
    }))
}
