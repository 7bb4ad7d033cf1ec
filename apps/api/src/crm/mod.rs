//! Record store: where scored candidates are persisted.
//!
//! The scoring pipeline holds an `Arc<dyn RecordStore>`; production uses
//! `SalesforceClient`, tests use an in-memory store.

pub mod salesforce;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::explain::formatter::{truncate_chars, MAX_SUMMARY_CHARS};
use crate::model::Decision;

pub use salesforce::SalesforceClient;

/// Ceiling for the long-text resume field.
pub const MAX_RESUME_TEXT_CHARS: usize = 32_000;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Flat field mapping for a candidate record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Full_Resume_Text__c")]
    pub resume_text: String,
    #[serde(rename = "Predicted_Status__c")]
    pub predicted_status: String,
    #[serde(rename = "Hire_Probability__c")]
    pub hire_probability: f64,
    #[serde(rename = "Prediction_Explanation__c")]
    pub explanation: String,
}

impl CandidateRecord {
    /// Applies the field length ceilings.
    pub fn new(
        name: &str,
        resume_text: &str,
        decision: Decision,
        probability: f64,
        explanation: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            resume_text: truncate_chars(resume_text, MAX_RESUME_TEXT_CHARS),
            predicted_status: decision.as_str().to_string(),
            hire_probability: probability,
            explanation: truncate_chars(explanation, MAX_SUMMARY_CHARS),
        }
    }
}

/// Outcome of a create call: success + id, or the store's error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome {
    pub success: bool,
    pub id: Option<String>,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, record: &CandidateRecord) -> Result<CreateOutcome, CrmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_truncates_long_fields() {
        let resume = "a".repeat(MAX_RESUME_TEXT_CHARS + 10);
        let explanation = "b".repeat(900);
        let record = CandidateRecord::new("Ada", &resume, Decision::Hire, 0.91, &explanation);
        assert_eq!(record.resume_text.len(), MAX_RESUME_TEXT_CHARS);
        assert_eq!(record.explanation.len(), MAX_SUMMARY_CHARS);
        assert_eq!(record.predicted_status, "Hire");
    }

    #[test]
    fn test_record_serializes_with_crm_field_names() {
        let record = CandidateRecord::new("Ada", "Rust", Decision::Reject, 0.1, "none");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["Name"], "Ada");
        assert_eq!(value["Full_Resume_Text__c"], "Rust");
        assert_eq!(value["Predicted_Status__c"], "Reject");
        assert_eq!(value["Hire_Probability__c"], 0.1);
        assert_eq!(value["Prediction_Explanation__c"], "none");
    }
}
