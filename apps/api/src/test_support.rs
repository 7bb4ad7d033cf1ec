//! In-memory collaborators and fixtures shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::config::Config;
use crate::crm::{CandidateRecord, CreateOutcome, CrmError, RecordStore};
use crate::explain::{ExplainerConfig, LimeTextExplainer};
use crate::mail::{MailError, Mailer};
use crate::model::{
    Classifier, FeatureVector, HiringModel, LogisticRegression, ModelError, TfidfVectorizer,
};
use crate::report::{ReportError, ReportRow, ReportSink};
use crate::scoring::extract::ResumeDocument;
use crate::scoring::pipeline::{ScoringPipeline, ScoringSettings};
use crate::state::AppState;

pub const BOUNDARY: &str = "hiring-test-boundary";

/// Ten-term vocabulary, unit idf.
pub fn sample_vectorizer() -> TfidfVectorizer {
    serde_json::from_value(json!({
        "vocabulary": {
            "python": 0, "aws": 1, "machine": 2, "learning": 3, "data": 4,
            "sql": 5, "docker": 6, "welding": 7, "cad": 8, "plumbing": 9
        },
        "idf": [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]
    }))
    .unwrap()
}

/// Logistic model that favours software keywords and penalises trade ones.
pub fn sample_model() -> HiringModel {
    let classifier = LogisticRegression {
        coef: vec![3.0, 2.0, 1.5, 1.5, 1.0, 1.0, 1.0, -3.0, -2.0, -2.0],
        intercept: -0.5,
    };
    HiringModel::new(sample_vectorizer(), Arc::new(classifier)).unwrap()
}

pub fn test_explainer() -> LimeTextExplainer {
    LimeTextExplainer::new(ExplainerConfig {
        num_samples: 200,
        workers: 2,
        ..ExplainerConfig::default()
    })
}

pub fn text_document(text: &str) -> ResumeDocument {
    ResumeDocument::new(text.as_bytes().to_vec(), Some("resume.txt".to_string()))
}

/// Returns the same probability for every input, optionally failing after `n` calls.
pub struct FixedClassifier {
    probability: f64,
    fail_after: Option<usize>,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(probability: f64) -> Self {
        Self {
            probability,
            fail_after: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_after(probability: f64, calls: usize) -> Self {
        Self {
            fail_after: Some(calls),
            ..Self::new(probability)
        }
    }
}

impl Classifier for FixedClassifier {
    fn predict_proba(&self, _features: &FeatureVector) -> Result<[f64; 2], ModelError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| n >= limit) {
            return Err(ModelError::Inference("classifier offline".to_string()));
        }
        Ok([1.0 - self.probability, self.probability])
    }

    fn kind(&self) -> &'static str {
        "fixed"
    }
}

enum StoreMode {
    Accept(String),
    Reject(Vec<String>),
    Unreachable,
}

pub struct MemoryRecordStore {
    mode: StoreMode,
    records: Mutex<Vec<CandidateRecord>>,
}

impl MemoryRecordStore {
    fn with_mode(mode: StoreMode) -> Self {
        Self {
            mode,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting(id: &str) -> Self {
        Self::with_mode(StoreMode::Accept(id.to_string()))
    }

    pub fn rejecting(errors: &[&str]) -> Self {
        Self::with_mode(StoreMode::Reject(
            errors.iter().map(|e| e.to_string()).collect(),
        ))
    }

    pub fn unreachable() -> Self {
        Self::with_mode(StoreMode::Unreachable)
    }

    pub fn records(&self) -> Vec<CandidateRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: &CandidateRecord) -> Result<CreateOutcome, CrmError> {
        match &self.mode {
            StoreMode::Accept(id) => {
                self.records.lock().unwrap().push(record.clone());
                Ok(CreateOutcome {
                    success: true,
                    id: Some(id.clone()),
                    errors: Vec::new(),
                })
            }
            StoreMode::Reject(errors) => Ok(CreateOutcome {
                success: false,
                id: None,
                errors: errors.clone(),
            }),
            StoreMode::Unreachable => Err(CrmError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct MemoryReportSink {
    fail: bool,
    rows: Mutex<Vec<ReportRow>>,
}

impl MemoryReportSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<ReportRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    async fn append(&self, row: ReportRow) -> Result<(), ReportError> {
        if self.fail {
            return Err(ReportError::Task("disk full".to_string()));
        }
        self.rows.lock().unwrap().push(row);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMailer {
    fail: bool,
    sent: Mutex<Vec<(String, String, String)>>,
}

impl MemoryMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(to, subject, body)` of every delivered message.
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        // Recipients are checked the same way the SMTP mailer checks them.
        if let Err(source) = to.parse::<lettre::Address>() {
            return Err(MailError::Address {
                address: to.to_string(),
                source,
            });
        }
        if self.fail {
            // A message without a sender fails to build; stands in for a relay failure.
            let source = lettre::Message::builder()
                .body(String::new())
                .unwrap_err();
            return Err(MailError::Message(source));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

pub fn pipeline_with(
    classifier: Arc<dyn Classifier>,
    records: Arc<dyn RecordStore>,
    reports: Arc<dyn ReportSink>,
) -> ScoringPipeline {
    let model = HiringModel::new(sample_vectorizer(), classifier).unwrap();
    ScoringPipeline::new(
        Arc::new(model),
        Arc::new(test_explainer()),
        records,
        reports,
        ScoringSettings::default(),
    )
}

/// Configuration with only the required variables set.
pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = [
        ("SF_USERNAME", "hr@example.com"),
        ("SF_PASSWORD", "pw"),
        ("SF_TOKEN", "tok"),
        ("SF_CLIENT_ID", "cid"),
        ("SF_CLIENT_SECRET", "secret"),
    ]
    .into_iter()
    .collect();
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

pub fn test_state(pipeline: ScoringPipeline, mailer: Option<Arc<dyn Mailer>>) -> AppState {
    AppState {
        config: test_config(),
        pipeline: Arc::new(pipeline.with_mailer(mailer.clone())),
        mailer,
    }
}

/// A `multipart/form-data` part: `(field name, optional file name, contents)`.
pub type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, contents) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(file_name) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
