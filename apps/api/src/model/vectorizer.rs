use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{FeatureVector, ModelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

fn default_min_token_len() -> usize {
    2
}

/// Pre-fitted TF-IDF vectorizer, loaded from a JSON export of the training pipeline.
///
/// Tokens are the space-separated words of normalized text no shorter than
/// `min_token_len`; n-grams join consecutive tokens with a single space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    pub vocabulary: HashMap<String, usize>,
    pub idf: Vec<f64>,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    #[serde(default)]
    pub stop_words: HashSet<String>,
}

impl TfidfVectorizer {
    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let vectorizer: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ModelError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        vectorizer.validate()?;
        Ok(vectorizer)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.vocabulary.is_empty() {
            return Err(ModelError::Artifact("vectorizer vocabulary is empty".into()));
        }
        if self.vocabulary.len() != self.idf.len() {
            return Err(ModelError::Artifact(format!(
                "vocabulary has {} terms but idf has {} weights",
                self.vocabulary.len(),
                self.idf.len()
            )));
        }
        if let Some((term, &index)) = self.vocabulary.iter().find(|(_, &i)| i >= self.idf.len()) {
            return Err(ModelError::Artifact(format!(
                "term '{term}' maps to index {index}, outside {} features",
                self.idf.len()
            )));
        }
        let (lo, hi) = self.ngram_range;
        if lo == 0 || lo > hi {
            return Err(ModelError::Artifact(format!(
                "invalid ngram_range ({lo}, {hi})"
            )));
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    /// Maps text to a dense TF-IDF vector of `dimension()` entries.
    pub fn transform(&self, text: &str) -> FeatureVector {
        let tokens: Vec<&str> = text
            .split_whitespace()
            .filter(|t| t.chars().count() >= self.min_token_len)
            .filter(|t| !self.stop_words.contains(*t))
            .collect();

        let mut counts: HashMap<usize, f64> = HashMap::new();
        let (lo, hi) = self.ngram_range;
        for n in lo..=hi {
            if n > tokens.len() {
                break;
            }
            for window in tokens.windows(n) {
                let term = window.join(" ");
                if let Some(&index) = self.vocabulary.get(&term) {
                    *counts.entry(index).or_insert(0.0) += 1.0;
                }
            }
        }

        let mut values = vec![0.0; self.dimension()];
        for (index, tf) in counts {
            let tf = if self.sublinear_tf { 1.0 + tf.ln() } else { tf };
            values[index] = tf * self.idf[index];
        }

        match self.norm {
            Some(Norm::L2) => {
                let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > 0.0 {
                    values.iter_mut().for_each(|v| *v /= norm);
                }
            }
            Some(Norm::L1) => {
                let norm = values.iter().map(|v| v.abs()).sum::<f64>();
                if norm > 0.0 {
                    values.iter_mut().for_each(|v| *v /= norm);
                }
            }
            None => {}
        }

        FeatureVector(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vectorizer(extra: serde_json::Value) -> TfidfVectorizer {
        let mut base = json!({
            "vocabulary": {"python": 0, "aws": 1, "welding": 2, "machine learning": 3},
            "idf": [1.0, 2.0, 1.5, 3.0]
        });
        if let (Some(obj), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn test_defaults_match_unigram_l2() {
        let v = vectorizer(json!({}));
        assert_eq!(v.ngram_range, (1, 1));
        assert_eq!(v.norm, Some(Norm::L2));
        assert_eq!(v.min_token_len, 2);
        v.validate().unwrap();
    }

    #[test]
    fn test_transform_is_l2_normalized() {
        let v = vectorizer(json!({}));
        let vec = v.transform("python aws aws unknown");
        let norm: f64 = vec.0.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        // aws: tf 2 * idf 2 = 4, python: 1 * 1 = 1
        assert!((vec.0[1] / vec.0[0] - 4.0).abs() < 1e-9);
        assert_eq!(vec.0[2], 0.0);
    }

    #[test]
    fn test_bigrams_counted_when_range_allows() {
        let v = vectorizer(json!({"ngram_range": [1, 2], "norm": null}));
        let vec = v.transform("machine learning python");
        assert_eq!(vec.0[3], 3.0);
        assert_eq!(vec.0[0], 1.0);
    }

    #[test]
    fn test_unknown_text_gives_zero_vector() {
        let v = vectorizer(json!({}));
        let vec = v.transform("carpentry plumbing");
        assert!(vec.0.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_sublinear_tf() {
        let v = vectorizer(json!({"sublinear_tf": true, "norm": null}));
        let vec = v.transform("python python python");
        assert!((vec.0[0] - (1.0 + 3.0_f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let v: TfidfVectorizer = serde_json::from_value(json!({
            "vocabulary": {"python": 0, "aws": 5},
            "idf": [1.0, 1.0]
        }))
        .unwrap();
        assert!(matches!(v.validate(), Err(ModelError::Artifact(_))));
    }
}
