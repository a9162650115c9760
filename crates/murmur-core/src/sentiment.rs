use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    Error,
}

impl SentimentLabel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Error => "error",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a unit inside its publication. Comments are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UnitKind {
    Post,
    Comment(u32),
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Post => f.write_str("post"),
            UnitKind::Comment(n) => write!(f, "comment_{n}"),
        }
    }
}

impl From<UnitKind> for String {
    fn from(kind: UnitKind) -> Self {
        kind.to_string()
    }
}

impl TryFrom<String> for UnitKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "post" {
            return Ok(UnitKind::Post);
        }
        value
            .strip_prefix("comment_")
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n >= 1)
            .map(UnitKind::Comment)
            .ok_or_else(|| format!("invalid unit kind '{value}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSentiment {
    pub kind: UnitKind,
    pub label: SentimentLabel,
    pub explanation: String,
    pub latency_seconds: f64,
}

/// Classification outcome for one publication within one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationAnalysis {
    pub publication_id: String,
    pub overall_label: SentimentLabel,
    pub post_result: Option<UnitSentiment>,
    pub comment_results: Vec<UnitSentiment>,
    pub processing_seconds: f64,
}

impl PublicationAnalysis {
    /// Post first, then comments in index order.
    pub fn units(&self) -> impl Iterator<Item = &UnitSentiment> {
        self.post_result.iter().chain(self.comment_results.iter())
    }
}

/// One completed analysis run for a `(source, topic)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub source: Source,
    pub topic: String,
    pub report_text: String,
    pub model: String,
    pub concurrency_limit: usize,
    pub analyses: Vec<PublicationAnalysis>,
    pub created_at: DateTime<Utc>,
}

/// Tally of labels, with `Error` kept apart from the voting labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub error: usize,
}

impl LabelCounts {
    pub fn add(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Negative => self.negative += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Error => self.error += 1,
        }
    }

    pub fn merge(&mut self, other: &LabelCounts) {
        self.positive += other.positive;
        self.negative += other.negative;
        self.neutral += other.neutral;
        self.error += other.error;
    }

    /// Units that take part in a vote.
    #[must_use]
    pub fn included(&self) -> usize {
        self.positive + self.negative + self.neutral
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.included() + self.error
    }

    /// Strict-majority verdict. A tie for first place, or nothing to count,
    /// yields `Neutral`.
    #[must_use]
    pub fn verdict(&self) -> SentimentLabel {
        let candidates = [
            (SentimentLabel::Positive, self.positive),
            (SentimentLabel::Negative, self.negative),
            (SentimentLabel::Neutral, self.neutral),
        ];
        let best = candidates.iter().map(|(_, n)| *n).max().unwrap_or(0);
        if best == 0 {
            return SentimentLabel::Neutral;
        }
        let mut leaders = candidates.iter().filter(|(_, n)| *n == best);
        match (leaders.next(), leaders.next()) {
            (Some((label, _)), None) => *label,
            _ => SentimentLabel::Neutral,
        }
    }
}

impl FromIterator<SentimentLabel> for LabelCounts {
    fn from_iter<I: IntoIterator<Item = SentimentLabel>>(iter: I) -> Self {
        let mut counts = LabelCounts::default();
        for label in iter {
            counts.add(label);
        }
        counts
    }
}

/// Majority vote over `labels`, ignoring `Error`.
pub fn majority_label<I>(labels: I) -> SentimentLabel
where
    I: IntoIterator<Item = SentimentLabel>,
{
    labels.into_iter().collect::<LabelCounts>().verdict()
}

#[cfg(test)]
mod tests {
    use super::*;
    use SentimentLabel::{Error, Negative, Neutral, Positive};

    #[test]
    fn clear_majority_wins() {
        assert_eq!(majority_label([Positive, Positive, Negative]), Positive);
    }

    #[test]
    fn no_strict_majority_is_neutral() {
        assert_eq!(majority_label([Positive, Negative, Neutral]), Neutral);
        assert_eq!(majority_label([Positive, Negative]), Neutral);
    }

    #[test]
    fn errors_are_excluded_from_vote() {
        assert_eq!(majority_label([Error, Error, Negative]), Negative);
        assert_eq!(majority_label([Error, Error, Error]), Neutral);
    }

    #[test]
    fn empty_vote_is_neutral() {
        assert_eq!(majority_label(std::iter::empty()), Neutral);
    }

    #[test]
    fn plurality_is_enough_when_unique() {
        assert_eq!(majority_label([Negative, Negative, Positive, Neutral]), Negative);
    }

    #[test]
    fn counts_track_error_separately() {
        let counts: LabelCounts = [Positive, Error, Neutral, Error].into_iter().collect();
        assert_eq!(counts.included(), 2);
        assert_eq!(counts.error, 2);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn unit_kind_serializes_as_display_string() {
        assert_eq!(serde_json::to_string(&UnitKind::Post).unwrap(), "\"post\"");
        assert_eq!(
            serde_json::to_string(&UnitKind::Comment(3)).unwrap(),
            "\"comment_3\""
        );
        let parsed: UnitKind = serde_json::from_str("\"comment_2\"").unwrap();
        assert_eq!(parsed, UnitKind::Comment(2));
        assert!(serde_json::from_str::<UnitKind>("\"comment_0\"").is_err());
    }

    #[test]
    fn post_sorts_before_comments() {
        let mut kinds = vec![UnitKind::Comment(2), UnitKind::Post, UnitKind::Comment(1)];
        kinds.sort();
        assert_eq!(kinds, vec![UnitKind::Post, UnitKind::Comment(1), UnitKind::Comment(2)]);
    }

    #[test]
    fn label_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Error).unwrap(), "\"error\"");
    }
}
