// Local explanations for classifier decisions.
// `lime` fits the surrogate; `formatter` turns contributions into display text.

pub mod formatter;
pub mod lime;
pub mod ridge;

use serde::Serialize;

pub use formatter::{ExplanationOutcome, ExplanationSummary};
pub use lime::{ExplainerConfig, ExplanationError, LimeTextExplainer};

/// Signed surrogate weight of one word. Positive pushes toward the explained class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenContribution {
    pub token: String,
    pub weight: f64,
}
