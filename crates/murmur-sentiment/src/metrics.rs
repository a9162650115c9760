use serde::Serialize;

/// Timing context for one analysis run.
///
/// Per-publication processing time and run wall-clock time are separate
/// measurements; under concurrency the former does not sum to the latter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    pub wall_clock_seconds: f64,
    pub publication_seconds: Vec<f64>,
    pub call_latencies: Vec<f64>,
}

impl RunMetrics {
    #[must_use]
    pub fn publications(&self) -> usize {
        self.publication_seconds.len()
    }

    #[must_use]
    pub fn total_publication_seconds(&self) -> f64 {
        self.publication_seconds.iter().sum()
    }

    #[must_use]
    pub fn mean_publication_seconds(&self) -> Option<f64> {
        mean(&self.publication_seconds)
    }

    #[must_use]
    pub fn median_publication_seconds(&self) -> Option<f64> {
        if self.publication_seconds.is_empty() {
            return None;
        }
        let mut sorted = self.publication_seconds.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }

    #[must_use]
    pub fn total_call_latency(&self) -> f64 {
        self.call_latencies.iter().sum()
    }

    #[must_use]
    pub fn mean_call_latency(&self) -> Option<f64> {
        mean(&self.call_latencies)
    }

    /// Publications per wall-clock second.
    #[must_use]
    pub fn throughput(&self) -> Option<f64> {
        if self.wall_clock_seconds > 0.0 && !self.publication_seconds.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let n = self.publication_seconds.len() as f64;
            Some(n / self.wall_clock_seconds)
        } else {
            None
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
