//! Reddit adapter over the public JSON listing endpoints.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use murmur_core::text::{join_segments, truncate_chars};
use murmur_core::{AppConfig, Source};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::adapter::{cancellable_sleep, HarvestedItem, SourceAdapter, WorkerSink};
use crate::error::SourceError;

const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const PAGE_LIMIT: usize = 25;
const MAX_COMMENTS: usize = 10;
const COMMENT_MAX_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Pause between consecutive requests.
    pub inter_request_delay: Duration,
}

impl RedditConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: config.harvest_user_agent.clone(),
            request_timeout: Duration::from_secs(config.harvest_request_timeout_secs),
            inter_request_delay: Duration::from_millis(config.harvest_inter_request_delay_ms),
        }
    }
}

/// Search listing wrapper.
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: ThingData,
}

/// Fields shared by posts (`t3`) and comments (`t1`).
#[derive(Debug, Deserialize)]
struct ThingData {
    id: Option<String>,
    title: Option<String>,
    selftext: Option<String>,
    body: Option<String>,
    permalink: Option<String>,
    created_utc: Option<f64>,
}

pub struct RedditAdapter {
    client: reqwest::Client,
    config: RedditConfig,
}

impl RedditAdapter {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(config: RedditConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn search_page(
        &self,
        topic: &str,
        after: Option<&str>,
    ) -> Result<ListingData, SourceError> {
        let url = format!("{}/search.json", self.config.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("q", topic.to_string()),
            ("sort", "new".to_string()),
            ("type", "link".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(after) = after {
            params.push(("after", after.to_string()));
        }

        let response = self.client.get(&url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                platform: Source::Reddit,
                status: response.status().as_u16(),
                url,
            });
        }

        let listing: Listing = response.json().await.map_err(|e| SourceError::Parse {
            platform: Source::Reddit,
            reason: format!("search listing: {e}"),
        })?;
        Ok(listing.data)
    }

    async fn fetch_comments(&self, permalink: &str) -> Result<Vec<String>, SourceError> {
        let url = format!(
            "{}{}.json",
            self.config.base_url,
            permalink.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("limit", MAX_COMMENTS.to_string()),
                ("depth", "1".to_string()),
                ("raw_json", "1".to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                platform: Source::Reddit,
                status: response.status().as_u16(),
                url,
            });
        }

        // The thread endpoint returns [post listing, comment listing].
        let listings: Vec<Listing> = response.json().await.map_err(|e| SourceError::Parse {
            platform: Source::Reddit,
            reason: format!("comment listing: {e}"),
        })?;

        Ok(listings
            .into_iter()
            .nth(1)
            .map(|l| l.data.children)
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.kind == "t1")
            .filter_map(|c| c.data.body)
            .map(|body| body.trim().to_string())
            .filter(|body| !body.is_empty() && body != "[deleted]" && body != "[removed]")
            .take(MAX_COMMENTS)
            .map(|body| truncate_chars(&body, COMMENT_MAX_CHARS).to_string())
            .collect())
    }
}

fn post_text(data: &ThingData) -> String {
    let title = data.title.as_deref().unwrap_or("").trim();
    let body = data.selftext.as_deref().unwrap_or("").trim();
    match (title.is_empty(), body.is_empty()) {
        (false, false) => format!("{title}. {body}"),
        (false, true) => title.to_string(),
        _ => body.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn published_at(created_utc: Option<f64>) -> String {
    created_utc
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn source(&self) -> Source {
        Source::Reddit
    }

    async fn run(
        &self,
        topic: &str,
        max_items: usize,
        sink: &mut WorkerSink,
        stop: &CancellationToken,
    ) -> Result<(), SourceError> {
        let delay = self.config.inter_request_delay;
        let mut after: Option<String> = None;
        let mut pages = 0usize;

        while sink.should_continue() {
            let page = self.search_page(topic, after.as_deref()).await?;
            pages += 1;
            tracing::debug!(
                source = %Source::Reddit,
                page = pages,
                posts = page.children.len(),
                max_items,
                "fetched search page"
            );
            if page.children.is_empty() {
                break;
            }

            for post in page.children.into_iter().filter(|t| t.kind == "t3") {
                if !sink.should_continue() {
                    return Ok(());
                }
                let Some(reddit_id) = post.data.id.as_deref() else {
                    continue;
                };
                let id = format!("RD_{reddit_id}");
                if sink.has_seen(&id) {
                    continue;
                }

                let text = post_text(&post.data);
                if text.is_empty() {
                    continue;
                }

                let comments = match post.data.permalink.as_deref() {
                    Some(permalink) => {
                        if !cancellable_sleep(delay, stop).await {
                            return Ok(());
                        }
                        match self.fetch_comments(permalink).await {
                            Ok(comments) => comments,
                            Err(e) => {
                                tracing::warn!(
                                    source = %Source::Reddit,
                                    id = %id,
                                    error = %e,
                                    "comment fetch failed, keeping post only"
                                );
                                Vec::new()
                            }
                        }
                    }
                    None => Vec::new(),
                };

                let item = HarvestedItem {
                    id,
                    published_at: published_at(post.data.created_utc),
                    raw_text: join_segments(&text, &comments),
                };
                if !sink.emit(item).await.should_continue() {
                    return Ok(());
                }
            }

            match page.after {
                Some(next) => after = Some(next),
                None => break,
            }
            if !cancellable_sleep(delay, stop).await {
                break;
            }
        }

        Ok(())
    }
}
