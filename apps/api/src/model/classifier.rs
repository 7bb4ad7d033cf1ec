//! Classifier: pluggable, trait-based binary scorer over TF-IDF vectors.
//!
//! Default: `LogisticRegression`, loaded from the exported coefficients of the trained model.
//! The scoring pipeline holds an `Arc<dyn Classifier>`, so tests and alternative
//! backends swap in without touching callers.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{Decision, FeatureVector, ModelError, PredictionResult};

/// Maps a feature vector to class probabilities, indexed `[Reject, Hire]`.
pub trait Classifier: Send + Sync {
    fn predict_proba(&self, features: &FeatureVector) -> Result<[f64; 2], ModelError>;

    /// Feature dimension the classifier was trained on, when it has a fixed one.
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Short backend label for diagnostics.
    fn kind(&self) -> &'static str;

    /// The classifier's own decision rule: `Hire` iff P(Hire) >= 0.5.
    fn predict(&self, features: &FeatureVector) -> Result<PredictionResult, ModelError> {
        let proba = self.predict_proba(features)?;
        let probability = proba[Decision::Hire.class_index()];
        Ok(PredictionResult {
            label: Decision::from_probability(probability),
            probability,
        })
    }
}

/// Binary logistic regression: P(Hire) = sigmoid(coef · x + intercept).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let model: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ModelError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        if model.coef.is_empty() {
            return Err(ModelError::Artifact("classifier has no coefficients".into()));
        }
        if !model.intercept.is_finite() || model.coef.iter().any(|c| !c.is_finite()) {
            return Err(ModelError::Artifact(
                "classifier coefficients must be finite".into(),
            ));
        }
        Ok(model)
    }
}

impl Classifier for LogisticRegression {
    fn predict_proba(&self, features: &FeatureVector) -> Result<[f64; 2], ModelError> {
        if features.0.len() != self.coef.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.coef.len(),
                actual: features.0.len(),
            });
        }
        let z: f64 = self
            .coef
            .iter()
            .zip(&features.0)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        let p = sigmoid(z);
        Ok([1.0 - p, p])
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.coef.len())
    }

    fn kind(&self) -> &'static str {
        "logistic_regression"
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
