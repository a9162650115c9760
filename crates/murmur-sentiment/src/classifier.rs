//! Sentiment Unit Classifier: one text unit in, one [`UnitSentiment`] out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use murmur_core::text::{truncate_chars, UNIT_TEXT_MAX_CHARS};
use murmur_core::{SentimentLabel, UnitKind, UnitSentiment};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backoff::{retry_rate_limited, BackoffPolicy};
use crate::client::CompletionClient;
use crate::error::CompletionError;
use crate::parse::{cap_explanation, parse_reply};

/// Units shorter than this are not sent to the model.
pub const MIN_TEXT_CHARS: usize = 3;

const SYSTEM_PROMPT: &str =
    "You are a sentiment classifier for short social media posts and comments.";

/// Shared counters; the only mutable state a classifier touches.
#[derive(Debug, Default)]
pub struct ClassifierStats {
    calls: AtomicU64,
    rate_limit_retries: AtomicU64,
    short_circuits: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierStatsSnapshot {
    pub calls: u64,
    pub rate_limit_retries: u64,
    pub short_circuits: u64,
    pub errors: u64,
}

impl ClassifierStats {
    #[must_use]
    pub fn snapshot(&self) -> ClassifierStatsSnapshot {
        ClassifierStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            rate_limit_retries: self.rate_limit_retries.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

pub struct SentimentClassifier {
    client: Option<Arc<dyn CompletionClient>>,
    policy: BackoffPolicy,
    stats: Arc<ClassifierStats>,
}

impl SentimentClassifier {
    #[must_use]
    pub fn new(client: Arc<dyn CompletionClient>, policy: BackoffPolicy) -> Self {
        Self {
            client: Some(client),
            policy,
            stats: Arc::new(ClassifierStats::default()),
        }
    }

    /// A classifier with no completion API: every non-trivial unit is an `Error`.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self {
            client: None,
            policy: BackoffPolicy::default(),
            stats: Arc::new(ClassifierStats::default()),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.client.as_deref().map_or("unconfigured", |c| c.model())
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<ClassifierStats> {
        &self.stats
    }

    pub async fn classify(&self, text: &str, kind: UnitKind) -> UnitSentiment {
        self.classify_until(text, kind, &CancellationToken::new())
            .await
    }

    /// Like [`classify`](Self::classify), but a set `stop` cuts backoff short
    /// and yields an `Error` label.
    pub async fn classify_until(
        &self,
        text: &str,
        kind: UnitKind,
        stop: &CancellationToken,
    ) -> UnitSentiment {
        let text = text.trim();
        if text.chars().count() < MIN_TEXT_CHARS {
            self.stats.short_circuits.fetch_add(1, Ordering::Relaxed);
            return UnitSentiment {
                kind,
                label: SentimentLabel::Neutral,
                explanation: "too short".to_string(),
                latency_seconds: 0.0,
            };
        }

        let started = Instant::now();
        let outcome = match &self.client {
            Some(client) => self.call(client.as_ref(), text, stop).await,
            None => Err(CompletionError::NotConfigured),
        };
        let latency_seconds = started.elapsed().as_secs_f64();

        match outcome {
            Ok(reply) => {
                let (label, explanation) = parse_reply(&reply);
                tracing::debug!(unit = %kind, label = %label, latency_seconds, "unit classified");
                UnitSentiment {
                    kind,
                    label,
                    explanation,
                    latency_seconds,
                }
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(unit = %kind, error = %e, "unit classification failed");
                UnitSentiment {
                    kind,
                    label: SentimentLabel::Error,
                    explanation: cap_explanation(&e.to_string()),
                    latency_seconds,
                }
            }
        }
    }

    async fn call(
        &self,
        client: &dyn CompletionClient,
        text: &str,
        stop: &CancellationToken,
    ) -> Result<String, CompletionError> {
        let prompt = build_prompt(text);
        retry_rate_limited(
            self.policy,
            stop,
            || {
                self.stats.rate_limit_retries.fetch_add(1, Ordering::Relaxed);
            },
            || {
                self.stats.calls.fetch_add(1, Ordering::Relaxed);
                client.complete(SYSTEM_PROMPT, &prompt)
            },
        )
        .await
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        "Classify the sentiment of the following text as positive, negative or neutral.\n\
         Respond with JSON only, in this exact shape:\n\
         {{\"label\": \"positive|negative|neutral\", \"explanation\": \"<max 15 words>\"}}\n\n\
         Text: {}",
        truncate_chars(text, UNIT_TEXT_MAX_CHARS)
    )
}

#[cfg(test)]
#[path = "classifier_test.rs"]
mod tests;
