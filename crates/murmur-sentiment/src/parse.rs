//! Turning a free-form model reply into a label and explanation.

use std::sync::LazyLock;

use murmur_core::text::truncate_chars;
use murmur_core::SentimentLabel;
use regex::Regex;
use serde::Deserialize;

/// Maximum characters kept from an explanation.
pub const EXPLANATION_MAX_CHARS: usize = 200;

/// Characters of raw reply kept as the explanation when only a keyword matched.
const FALLBACK_EXPLANATION_CHARS: usize = 100;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid regex"));

#[derive(Deserialize)]
struct Verdict {
    #[serde(alias = "sentiment")]
    label: Option<String>,
    explanation: Option<String>,
}

/// Remove a surrounding ```` ```json ```` / ```` ``` ```` fence, if any.
#[must_use]
pub fn strip_fences(raw: &str) -> &str {
    FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or_else(|| raw.trim(), |m| m.as_str())
}

/// Map a model-provided label onto the fixed set; anything else is `Neutral`.
#[must_use]
pub fn coerce_label(raw: &str) -> SentimentLabel {
    match raw.trim().to_ascii_lowercase().as_str() {
        "positive" => SentimentLabel::Positive,
        "negative" => SentimentLabel::Negative,
        _ => SentimentLabel::Neutral,
    }
}

/// Interpret a reply: structured JSON first, then a keyword scan, then `Neutral`.
#[must_use]
pub fn parse_reply(raw: &str) -> (SentimentLabel, String) {
    let body = strip_fences(raw);

    if let Ok(verdict) = serde_json::from_str::<Verdict>(body) {
        let label = verdict
            .label
            .as_deref()
            .map_or(SentimentLabel::Neutral, coerce_label);
        let explanation = verdict.explanation.unwrap_or_default();
        return (label, cap_explanation(&explanation));
    }

    let lowered = raw.to_lowercase();
    let label = if lowered.contains("positive") {
        SentimentLabel::Positive
    } else if lowered.contains("negative") {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };
    let explanation = truncate_chars(raw.trim(), FALLBACK_EXPLANATION_CHARS);
    (label, cap_explanation(explanation))
}

#[must_use]
pub fn cap_explanation(explanation: &str) -> String {
    truncate_chars(explanation.trim(), EXPLANATION_MAX_CHARS).to_string()
}
