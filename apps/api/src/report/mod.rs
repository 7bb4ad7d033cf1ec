//! Report sink: one row per persisted prediction, read by the BI dashboard.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::model::Decision;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("report row encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("report writer task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub record_id: String,
    pub decision: Decision,
    pub probability: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct CsvRecord<'a> {
    #[serde(rename = "Salesforce_ID")]
    record_id: &'a str,
    #[serde(rename = "Prediction_Date")]
    prediction_date: String,
    #[serde(rename = "Predicted_Status")]
    predicted_status: &'a str,
    #[serde(rename = "Hire_Probability")]
    hire_probability: f64,
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn append(&self, row: ReportRow) -> Result<(), ReportError>;
}

/// Appends rows to a CSV file, writing the header only when the file is new.
///
/// Appends are serialized through a mutex so concurrent requests never interleave rows.
pub struct CsvReportSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReportSink for CsvReportSink {
    async fn append(&self, row: ReportRow) -> Result<(), ReportError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_row(&path, &row))
            .await
            .map_err(|e| ReportError::Task(e.to_string()))??;
        info!("Prediction appended to {}", self.path.display());
        Ok(())
    }
}

fn write_row(path: &Path, row: &ReportRow) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    writer.serialize(CsvRecord {
        record_id: &row.record_id,
        prediction_date: row.timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        predicted_status: row.decision.as_str(),
        hire_probability: row.probability,
    })?;
    writer.flush()?;
    Ok(())
}
