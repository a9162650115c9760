//! Offline adapter that re-emits previously captured publications from a
//! JSON-lines file, one object per line:
//!
//! ```text
//! {"source":"reddit","id":"RD_1","published_at":"2024-05-01","raw_text":"post | comment"}
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use murmur_core::Source;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::adapter::{HarvestedItem, SourceAdapter, WorkerSink};
use crate::error::SourceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub source: Source,
    /// When blank, an id is derived from the text.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub published_at: String,
    pub raw_text: String,
}

pub struct ReplayAdapter {
    source: Source,
    path: PathBuf,
}

impl ReplayAdapter {
    #[must_use]
    pub fn new(source: Source, path: PathBuf) -> Self {
        Self { source, path }
    }

    fn parse(&self, contents: &str) -> Vec<ReplayRecord> {
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(idx, line)| match serde_json::from_str::<ReplayRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = idx + 1,
                        error = %e,
                        "skipping malformed replay line"
                    );
                    None
                }
            })
            .filter(|record| record.source == self.source)
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for ReplayAdapter {
    fn source(&self) -> Source {
        self.source
    }

    async fn run(
        &self,
        topic: &str,
        max_items: usize,
        sink: &mut WorkerSink,
        stop: &CancellationToken,
    ) -> Result<(), SourceError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let records = self.parse(&contents);
        tracing::debug!(
            source = %self.source,
            topic = %topic,
            records = records.len(),
            max_items,
            "replaying captured publications"
        );

        for record in records {
            if stop.is_cancelled() {
                break;
            }
            let id = if record.id.trim().is_empty() {
                content_id(self.source, &record.raw_text)
            } else {
                record.id
            };
            let status = sink
                .emit(HarvestedItem {
                    id,
                    published_at: record.published_at,
                    raw_text: record.raw_text,
                })
                .await;
            if !status.should_continue() {
                break;
            }
        }
        Ok(())
    }
}

/// Stable id for records captured without one.
fn content_id(source: Source, raw_text: &str) -> String {
    let digest = Sha256::digest(format!("{source}\n{raw_text}").as_bytes());
    let hex = format!("{digest:x}");
    format!("{}_{}", source.as_str().to_ascii_uppercase(), &hex[..16])
}
