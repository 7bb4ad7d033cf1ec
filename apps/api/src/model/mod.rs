// Pre-trained hiring model: TF-IDF vectorizer + binary classifier.
// Artifacts are loaded once at startup and shared read-only across requests.

pub mod classifier;
pub mod vectorizer;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use classifier::{Classifier, LogisticRegression};
pub use vectorizer::TfidfVectorizer;

/// P(Hire) at or above which the classifier decides `Hire`.
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model artifact {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model artifact: {0}")]
    Artifact(String),

    #[error("feature dimension mismatch: classifier expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("classifier failure: {0}")]
    Inference(String),
}

/// Dense TF-IDF feature vector. Transient; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(pub Vec<f64>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Reject,
    Hire,
}

impl Decision {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= DECISION_THRESHOLD {
            Decision::Hire
        } else {
            Decision::Reject
        }
    }

    /// Position of this class in `predict_proba` output.
    pub fn class_index(self) -> usize {
        match self {
            Decision::Reject => 0,
            Decision::Hire => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Reject => "Reject",
            Decision::Hire => "Hire",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: Decision,
    pub probability: f64,
}

/// Vectorizer and classifier composed into a single text → probability pipeline.
pub struct HiringModel {
    vectorizer: TfidfVectorizer,
    classifier: Arc<dyn Classifier>,
}

impl HiringModel {
    pub fn new(
        vectorizer: TfidfVectorizer,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, ModelError> {
        vectorizer.validate()?;
        if let Some(expected) = classifier.dimension() {
            if expected != vectorizer.dimension() {
                return Err(ModelError::DimensionMismatch {
                    expected,
                    actual: vectorizer.dimension(),
                });
            }
        }
        Ok(Self {
            vectorizer,
            classifier,
        })
    }

    /// Loads both artifacts from disk. Failure here is fatal for the host, which decides
    /// whether to exit.
    pub fn load(model_path: &Path, vectorizer_path: &Path) -> Result<Self, ModelError> {
        let vectorizer = TfidfVectorizer::from_path(vectorizer_path)?;
        let classifier = LogisticRegression::from_path(model_path)?;
        let model = Self::new(vectorizer, Arc::new(classifier))?;
        info!(
            "Model and vectorizer loaded ({} features, {})",
            model.vectorizer.dimension(),
            model.classifier.kind()
        );
        Ok(model)
    }

    pub fn predict(&self, text: &str) -> Result<PredictionResult, ModelError> {
        self.classifier.predict(&self.vectorizer.transform(text))
    }

    /// Class probabilities `[Reject, Hire]` for raw text; the explanation scorer.
    pub fn predict_proba(&self, text: &str) -> Result<[f64; 2], ModelError> {
        self.classifier
            .predict_proba(&self.vectorizer.transform(text))
    }

    pub fn feature_count(&self) -> usize {
        self.vectorizer.dimension()
    }

    pub fn classifier_kind(&self) -> &'static str {
        self.classifier.kind()
    }
}
