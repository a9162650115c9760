//! Plain-text rendering of an analysis run.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use murmur_core::{LabelCounts, PublicationAnalysis, SentimentLabel, Source, UnitKind};

use crate::metrics::RunMetrics;

pub const NOTHING_PROCESSED: &str = "No publications processed.";

/// Who and what produced the run; printed in the report header.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub source: Source,
    pub topic: String,
    pub created_at: DateTime<Utc>,
    pub model: String,
    pub concurrency_limit: usize,
}

#[must_use]
pub fn render_report(
    context: &ReportContext,
    analyses: &[PublicationAnalysis],
    metrics: &RunMetrics,
) -> String {
    // Writing into a String cannot fail.
    let mut out = String::new();
    let _ = writeln!(out, "Sentiment report");
    let _ = writeln!(out, "Source: {}", context.source);
    let _ = writeln!(out, "Topic: {}", context.topic);
    let _ = writeln!(out, "Created: {}", context.created_at.to_rfc3339());
    let _ = writeln!(out, "Model: {}", context.model);
    let _ = writeln!(out, "Concurrency cap: {}", context.concurrency_limit);

    if analyses.is_empty() {
        let _ = writeln!(out, "\n{NOTHING_PROCESSED}");
        return out;
    }

    let units: LabelCounts = analyses
        .iter()
        .flat_map(PublicationAnalysis::units)
        .map(|u| u.label)
        .collect();
    let verdicts: LabelCounts = analyses.iter().map(|a| a.overall_label).collect();
    let posts = analyses.iter().filter(|a| a.post_result.is_some()).count();
    let comments = analyses
        .iter()
        .flat_map(PublicationAnalysis::units)
        .filter(|u| matches!(u.kind, UnitKind::Comment(_)))
        .count();

    let _ = writeln!(out, "\nElements");
    let _ = writeln!(out, "  Publications: {}", analyses.len());
    let _ = writeln!(out, "  Posts: {posts}");
    let _ = writeln!(out, "  Comments: {comments}");
    let _ = writeln!(out, "  Units: {}", units.total());

    let _ = writeln!(out, "\nLabel distribution (units)");
    write_distribution(&mut out, &units);
    let _ = writeln!(out, "\nPublication verdicts");
    write_distribution(&mut out, &verdicts);

    let _ = writeln!(out, "\nPerformance");
    let _ = writeln!(out, "  Wall clock: {:.3} s", metrics.wall_clock_seconds);
    let _ = writeln!(
        out,
        "  Per publication: mean {}, median {}, total {:.3} s",
        seconds(metrics.mean_publication_seconds()),
        seconds(metrics.median_publication_seconds()),
        metrics.total_publication_seconds()
    );
    let _ = writeln!(
        out,
        "  Call latency: total {:.3} s, mean {}",
        metrics.total_call_latency(),
        seconds(metrics.mean_call_latency())
    );
    let _ = write!(
        out,
        "  Throughput: {}",
        metrics
            .throughput()
            .map_or_else(|| "n/a".to_string(), |t| format!("{t:.2} publications/s"))
    );

    out
}

fn write_distribution(out: &mut String, counts: &LabelCounts) {
    let included = counts.included();
    for (label, n) in [
        (SentimentLabel::Positive, counts.positive),
        (SentimentLabel::Negative, counts.negative),
        (SentimentLabel::Neutral, counts.neutral),
    ] {
        let _ = writeln!(out, "  {label}: {n} ({})", percent(n, included));
    }
    let _ = writeln!(out, "  {}: {}", SentimentLabel::Error, counts.error);
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> String {
    if whole == 0 {
        "n/a".to_string()
    } else {
        format!("{:.1}%", part as f64 * 100.0 / whole as f64)
    }
}

fn seconds(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3} s"))
}
