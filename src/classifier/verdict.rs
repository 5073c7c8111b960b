//! Verdict parsing.
//!
//! The model is asked for two lines, `REASON: ...` and `RESULT: SAFE|VIOLATION`.
//! Parsing is lenient: when the `RESULT:` label is missing, any occurrence of
//! `VIOLATION` in the text counts as a violation. Benign prose that mentions
//! the word will be flagged; that is accepted in exchange for not missing
//! slightly malformed violation answers.

use std::sync::LazyLock;

use regex::Regex;

/// Reason used when the model gives none.
pub const UNSPECIFIED_REASON: &str = "未说明理由";

/// Max characters of raw output used as a fallback reason.
const FALLBACK_REASON_CHARS: usize = 50;

static RESULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)RESULT:\s*(VIOLATION|SAFE)").expect("valid regex"));

static REASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)REASON:\s*(.+)").expect("valid regex"));

/// Classifier outcome for one audited event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub is_violation: bool,
    pub reason: String,
}

impl Verdict {
    /// Interpret free-text model output.
    pub fn parse(raw: &str) -> Self {
        let label = RESULT_RE
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_uppercase());

        let is_violation = match label {
            Some(label) => label == "VIOLATION",
            None => raw.to_uppercase().contains("VIOLATION"),
        };

        let reason = REASON_RE
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string());

        let reason = match reason {
            Some(reason) => reason,
            None if is_violation => raw
                .split('\n')
                .next()
                .unwrap_or_default()
                .chars()
                .take(FALLBACK_REASON_CHARS)
                .collect(),
            None => UNSPECIFIED_REASON.to_string(),
        };

        Self {
            is_violation,
            reason,
        }
    }
}
