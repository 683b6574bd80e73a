// src/services/timeline.rs

//! Timeline fetching with mirror failover.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::error::{AppError, Result};
use crate::models::{NitterConfig, TweetRecord};
use crate::services::parser::PageParser;
use crate::utils::http::HttpTransport;
use crate::utils::retry::RetryPolicy;
use crate::utils::timeline_url;

/// Reachability of one mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorProbe {
    pub mirror: String,
    pub reachable: bool,
}

/// Fetches timeline candidates from interchangeable Nitter mirrors.
pub struct TimelineFetcher {
    transport: Arc<dyn HttpTransport>,
    parser: Arc<dyn PageParser>,
    mirrors: Vec<String>,
    shuffle: bool,
    retry: RetryPolicy,
}

impl TimelineFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        parser: Arc<dyn PageParser>,
        config: &NitterConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            parser,
            mirrors: config.mirrors.clone(),
            shuffle: config.shuffle,
            retry,
        }
    }

    /// Newest-first candidates for `username`, at most `max_count`.
    ///
    /// The first mirror that yields at least one record wins. An empty result
    /// means every mirror failed.
    pub async fn fetch_candidates(&self, username: &str, max_count: usize) -> Vec<TweetRecord> {
        let mut mirrors = self.mirrors.clone();
        if self.shuffle {
            mirrors.shuffle(&mut rand::rng());
        }

        for mirror in &mirrors {
            let label = format!("timeline {username} via {mirror}");
            let result = self
                .retry
                .run(&label, |_| self.fetch_from_mirror(mirror, username))
                .await;

            match result {
                Ok(records) => {
                    log::info!(
                        "Fetched {} tweets for @{} from {}",
                        records.len(),
                        username,
                        mirror
                    );
                    return finalize_candidates(records, max_count);
                }
                Err(e) => {
                    log::warn!("Skipping mirror {mirror} for @{username}: {e}");
                }
            }
        }

        log::error!(
            "Failed to retrieve tweets for @{} from all {} mirrors",
            username,
            mirrors.len()
        );
        Vec::new()
    }

    /// One attempt against one mirror.
    async fn fetch_from_mirror(&self, mirror: &str, username: &str) -> Result<Vec<TweetRecord>> {
        let url = timeline_url(mirror, username);
        let response = self.transport.get(&url).await?.error_for_status(&url)?;
        let records = self.parser.parse(&response.body, &url, username);
        if records.is_empty() {
            return Err(AppError::parse(url, "page contained no usable tweets"));
        }
        Ok(records)
    }

    /// Hit every mirror once and report which answered with 2xx.
    pub async fn probe_mirrors(&self, username: &str) -> Vec<MirrorProbe> {
        let mut probes = Vec::with_capacity(self.mirrors.len());
        for mirror in &self.mirrors {
            let url = timeline_url(mirror, username);
            let reachable = match self.transport.get(&url).await {
                Ok(response) => response.is_success(),
                Err(e) => {
                    log::warn!("Connection test failed for {mirror}: {e}");
                    false
                }
            };
            probes.push(MirrorProbe {
                mirror: mirror.clone(),
                reachable,
            });
        }
        probes
    }
}

/// Deduplicate by id, sort newest first, keep `max_count`.
pub fn finalize_candidates(records: Vec<TweetRecord>, max_count: usize) -> Vec<TweetRecord> {
    let mut seen = HashSet::new();
    let mut unique: Vec<TweetRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect();
    unique.sort_by(|a, b| b.id.cmp(&a.id));
    unique.truncate(max_count);
    unique
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::TweetId;
    use crate::services::parser::NitterParser;
    use crate::utils::testing::{Reply, ScriptedTransport, nitter_page};

    fn record(id: &str) -> TweetRecord {
        TweetRecord {
            id: TweetId::parse(id).unwrap(),
            author: "jack".into(),
            content: format!("tweet {id}"),
            published_at: String::new(),
            url: String::new(),
            media_urls: vec![],
        }
    }

    fn ids(records: &[TweetRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn fetcher(transport: Arc<ScriptedTransport>, mirrors: &[&str]) -> TimelineFetcher {
        let config = NitterConfig {
            mirrors: mirrors.iter().map(|m| m.to_string()).collect(),
            shuffle: false,
        };
        TimelineFetcher::new(
            transport,
            Arc::new(NitterParser::new().unwrap()),
            &config,
            RetryPolicy::linear(3, Duration::ZERO),
        )
    }

    #[test]
    fn test_finalize_sorts_numerically() {
        let out = finalize_candidates(vec![record("100"), record("99"), record("101")], 10);
        assert_eq!(ids(&out), vec!["101", "100", "99"]);
    }

    #[test]
    fn test_finalize_dedups_and_truncates() {
        let out = finalize_candidates(
            vec![record("5"), record("7"), record("5"), record("6")],
            2,
        );
        assert_eq!(ids(&out), vec!["7", "6"]);
    }

    #[tokio::test]
    async fn test_failing_mirror_is_tried_exactly_max_retries() {
        let transport = Arc::new(ScriptedTransport::new().on("https://a.example", Reply::Refuse));
        let fetcher = fetcher(Arc::clone(&transport), &["https://a.example"]);

        let out = fetcher.fetch_candidates("jack", 10).await;

        assert!(out.is_empty());
        assert_eq!(transport.calls_to("https://a.example"), 3);
    }

    #[tokio::test]
    async fn test_failover_to_second_mirror() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on("https://a.example", Reply::status(502))
                .on(
                    "https://b.example",
                    Reply::ok(nitter_page("jack", &["12", "11"])),
                ),
        );
        let fetcher = fetcher(
            Arc::clone(&transport),
            &["https://a.example", "https://b.example"],
        );

        let out = fetcher.fetch_candidates("jack", 10).await;

        assert_eq!(ids(&out), vec!["12", "11"]);
        assert!(out[0].url.starts_with("https://b.example/"));
        assert_eq!(transport.calls_to("https://a.example"), 3);
        assert_eq!(transport.calls_to("https://b.example"), 1);
    }

    #[tokio::test]
    async fn test_first_successful_mirror_wins() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on("https://a.example", Reply::ok(nitter_page("jack", &["3"])))
                .on("https://b.example", Reply::ok(nitter_page("jack", &["4"]))),
        );
        let fetcher = fetcher(
            Arc::clone(&transport),
            &["https://a.example", "https://b.example"],
        );

        let out = fetcher.fetch_candidates("jack", 10).await;

        assert_eq!(ids(&out), vec!["3"]);
        assert_eq!(transport.calls_to("https://b.example"), 0);
    }

    #[tokio::test]
    async fn test_empty_page_counts_as_failure_then_recovers() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on("https://a.example", Reply::ok("<html>rate limited</html>"))
                .on("https://a.example", Reply::ok(nitter_page("jack", &["8"]))),
        );
        let fetcher = fetcher(Arc::clone(&transport), &["https://a.example"]);

        let out = fetcher.fetch_candidates("jack", 10).await;

        assert_eq!(ids(&out), vec!["8"]);
        assert_eq!(transport.calls_to("https://a.example"), 2);
    }

    #[tokio::test]
    async fn test_probe_reports_each_mirror() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on("https://a.example", Reply::ok("<html></html>"))
                .on("https://b.example", Reply::status(404)),
        );
        let fetcher = fetcher(
            Arc::clone(&transport),
            &["https://a.example", "https://b.example", "https://c.example"],
        );

        let probes = fetcher.probe_mirrors("jack").await;

        let reachable: Vec<bool> = probes.iter().map(|p| p.reachable).collect();
        assert_eq!(reachable, vec![true, false, false]);
    }
}
