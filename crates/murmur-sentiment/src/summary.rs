//! Cross-source roll-up of the latest analysis per source for a topic.

use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use murmur_core::{LabelCounts, PublicationAnalysis, SentimentLabel, Source};
use murmur_db::{DbError, StoredAnalysis};
use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source: Source,
    pub analyzed_at: DateTime<Utc>,
    pub publications: usize,
    /// Unit-level labels, errors counted separately.
    pub units: LabelCounts,
    /// Publication-level majority verdicts.
    pub verdicts: LabelCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicSummary {
    pub topic: String,
    pub sources: Vec<SourceSummary>,
    pub units: LabelCounts,
    pub verdicts: LabelCounts,
    /// Strict majority over publication verdicts; tie or empty is neutral.
    pub overall: SentimentLabel,
}

impl TopicSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Build a summary from already-loaded analyses. Order of `stored` does not
/// matter; sources are listed in their canonical order.
#[must_use]
pub fn summarize(topic: &str, mut stored: Vec<StoredAnalysis>) -> TopicSummary {
    stored.sort_by_key(|s| s.source);

    let sources: Vec<SourceSummary> = stored
        .iter()
        .map(|s| SourceSummary {
            source: s.source,
            analyzed_at: s.created_at,
            publications: s.analyses.len(),
            units: s
                .analyses
                .iter()
                .flat_map(PublicationAnalysis::units)
                .map(|u| u.label)
                .collect(),
            verdicts: s.analyses.iter().map(|a| a.overall_label).collect(),
        })
        .collect();

    let mut units = LabelCounts::default();
    let mut verdicts = LabelCounts::default();
    for s in &sources {
        units.merge(&s.units);
        verdicts.merge(&s.verdicts);
    }

    TopicSummary {
        topic: topic.to_string(),
        overall: verdicts.verdict(),
        sources,
        units,
        verdicts,
    }
}

/// Load the latest analysis of every source for `topic` and summarize it.
///
/// # Errors
///
/// Returns [`DbError`] if any lookup fails or a stored payload is invalid.
pub async fn topic_summary(pool: &SqlitePool, topic: &str) -> Result<TopicSummary, DbError> {
    let latest = try_join_all(
        Source::ALL
            .iter()
            .map(|source| murmur_db::latest_analysis(pool, *source, topic)),
    )
    .await?;

    Ok(summarize(topic, latest.into_iter().flatten().collect()))
}

impl fmt::Display for TopicSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Topic: {}", self.topic)?;
        if self.sources.is_empty() {
            return write!(f, "No analyses found.");
        }
        for s in &self.sources {
            writeln!(
                f,
                "  {:<10} {} publications, verdicts {}, units {} (analyzed {})",
                s.source.as_str(),
                s.publications,
                counts(&s.verdicts),
                counts(&s.units),
                s.analyzed_at.format("%Y-%m-%d %H:%M:%S"),
            )?;
        }
        writeln!(f, "Units: {}", counts(&self.units))?;
        writeln!(f, "Publication verdicts: {}", counts(&self.verdicts))?;
        write!(f, "Overall: {}", self.overall)
    }
}

fn counts(c: &LabelCounts) -> String {
    format!(
        "+{} -{} ={} !{}",
        c.positive, c.negative, c.neutral, c.error
    )
}

#[cfg(test)]
mod tests {
    use murmur_core::{UnitKind, UnitSentiment};

    use super::*;
    use SentimentLabel::{Error, Negative, Neutral, Positive};

    fn analysis(overall: SentimentLabel, labels: &[SentimentLabel]) -> PublicationAnalysis {
        let mut units = labels.iter().enumerate().map(|(i, label)| UnitSentiment {
            kind: if i == 0 {
                UnitKind::Post
            } else {
                UnitKind::Comment(u32::try_from(i).unwrap())
            },
            label: *label,
            explanation: String::new(),
            latency_seconds: 0.0,
        });
        PublicationAnalysis {
            publication_id: "id".into(),
            overall_label: overall,
            post_result: units.next(),
            comment_results: units.collect(),
            processing_seconds: 0.0,
        }
    }

    fn stored(source: Source, analyses: Vec<PublicationAnalysis>) -> StoredAnalysis {
        StoredAnalysis {
            id: 1,
            source,
            topic: "t".into(),
            created_at: Utc::now(),
            analyses,
        }
    }

    #[test]
    fn empty_topic_is_neutral() {
        let summary = summarize("t", vec![]);
        assert!(summary.is_empty());
        assert_eq!(summary.overall, Neutral);
        assert!(summary.to_string().contains("No analyses found."));
    }

    #[test]
    fn counts_units_and_verdicts_per_source() {
        let summary = summarize(
            "t",
            vec![
                stored(
                    Source::Twitter,
                    vec![analysis(Negative, &[Negative, Error, Negative])],
                ),
                stored(
                    Source::Reddit,
                    vec![
                        analysis(Positive, &[Positive]),
                        analysis(Positive, &[Positive, Positive, Negative]),
                    ],
                ),
            ],
        );

        assert_eq!(summary.sources[0].source, Source::Reddit);
        assert_eq!(summary.sources[0].units.positive, 3);
        assert_eq!(summary.sources[1].units.error, 1);
        assert_eq!(summary.units.total(), 7);
        assert_eq!(summary.units.error, 1);
        assert_eq!(summary.verdicts.positive, 2);
        assert_eq!(summary.verdicts.negative, 1);
        assert_eq!(summary.overall, Positive);
    }

    #[test]
    fn tied_verdicts_are_neutral() {
        let summary = summarize(
            "t",
            vec![
                stored(Source::Reddit, vec![analysis(Positive, &[Positive])]),
                stored(Source::Facebook, vec![analysis(Negative, &[Negative])]),
            ],
        );
        assert_eq!(summary.overall, Neutral);
        assert!(summary.to_string().ends_with("Overall: neutral"));
    }
}
