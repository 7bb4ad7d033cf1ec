use std::fmt::Display;

use serde::Serialize;

use crate::explain::lime::ExplanationError;
use crate::explain::TokenContribution;

/// Display budget for rendered explanations, in characters.
pub const MAX_SUMMARY_CHARS: usize = 500;

const SUMMARY_PREFIX: &str = "Model was influenced by: ";
const NO_POSITIVE: &str = "No strong POSITIVE factors found.";
const NO_NEGATIVE: &str = "No strong NEGATIVE factors found.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplanationSummary {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub text: String,
}

/// Result of the explain + format stages. A degraded outcome still carries display text.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplanationOutcome {
    Explained(ExplanationSummary),
    Degraded { reason: String, text: String },
}

impl ExplanationOutcome {
    pub fn from_result(result: Result<Vec<TokenContribution>, ExplanationError>) -> Self {
        match result {
            Ok(contributions) => ExplanationOutcome::Explained(format(&contributions)),
            Err(e) => ExplanationOutcome::Degraded {
                reason: e.to_string(),
                text: failure_text(&e),
            },
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ExplanationOutcome::Explained(summary) => &summary.text,
            ExplanationOutcome::Degraded { text, .. } => text,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ExplanationOutcome::Degraded { .. })
    }
}

/// Partitions contributions by sign and renders the factor summary.
/// Zero-weight tokens appear in neither group.
pub fn format(contributions: &[TokenContribution]) -> ExplanationSummary {
    let positive: Vec<String> = contributions
        .iter()
        .filter(|c| c.weight > 0.0)
        .map(|c| c.token.clone())
        .collect();
    let negative: Vec<String> = contributions
        .iter()
        .filter(|c| c.weight < 0.0)
        .map(|c| c.token.clone())
        .collect();

    let mut text = String::from(SUMMARY_PREFIX);
    if positive.is_empty() {
        text.push_str(NO_POSITIVE);
    } else {
        text.push_str(&format!("POSITIVE: {}.", positive.join(", ")));
    }
    text.push(' ');
    if negative.is_empty() {
        text.push_str(NO_NEGATIVE);
    } else {
        text.push_str(&format!("NEGATIVE: {}.", negative.join(", ")));
    }

    ExplanationSummary {
        positive,
        negative,
        text: truncate_chars(&text, MAX_SUMMARY_CHARS),
    }
}

/// Fallback text shown when no explanation could be produced.
pub fn failure_text(error: &impl Display) -> String {
    truncate_chars(
        &format!("Explanation failed due to internal LIME error: {error}"),
        MAX_SUMMARY_CHARS,
    )
}

/// Keeps the first `max` characters; the rest is dropped, not reflowed.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_index, _)) => s[..byte_index].to_string(),
        None => s.to_string(),
    }
}
