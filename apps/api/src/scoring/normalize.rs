use std::fmt;

use serde::Serialize;

/// Canonical resume text: lowercase ASCII letters and digits separated by single spaces.
///
/// Only constructible through [`normalize`], so every value upholds the invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Word-level tokens in document order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ').filter(|t| !t.is_empty())
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strips formatting noise from raw resume text.
///
/// Whitespace of any kind becomes a separator, every other non-alphanumeric ASCII
/// character is dropped, letters are lowercased and separator runs collapse to one
/// space. Separators are collapsed after removal so the output never carries double
/// spaces, which keeps the function idempotent.
pub fn normalize(raw: &str) -> NormalizedText {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    NormalizedText(out)
}
