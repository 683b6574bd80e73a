// src/services/stats.rs

//! Client for the account statistics API.

use std::sync::Arc;

use chrono::Utc;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::StatsSnapshot;
use crate::services::normalize::normalize_stats;
use crate::utils::http::HttpTransport;
use crate::utils::retry::RetryPolicy;

pub struct StatsClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    retry: RetryPolicy,
}

impl StatsClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            retry,
        }
    }

    /// Request URL for one account: the base URL plus a `username` query pair.
    pub fn query_url(&self, username: &str) -> Result<String> {
        let mut url = Url::parse(&self.base_url)?;
        url.query_pairs_mut().append_pair("username", username);
        Ok(url.to_string())
    }

    /// Fetch and normalize the current statistics for `username`.
    ///
    /// Transport failures, non-2xx statuses and undecodable bodies are all
    /// retried; `Err` means every attempt failed.
    pub async fn fetch_stats(&self, username: &str) -> Result<StatsSnapshot> {
        let url = self.query_url(username)?;
        let label = format!("stats for {username}");

        let snapshot = self
            .retry
            .run(&label, |_| self.fetch_once(&url, username))
            .await?;

        log::info!(
            "Stats for @{}: {} followers, {} following, {} tweets",
            username,
            snapshot.followers,
            snapshot.following,
            snapshot.tweet_count
        );
        Ok(snapshot)
    }

    async fn fetch_once(&self, url: &str, username: &str) -> Result<StatsSnapshot> {
        let response = self.transport.get(url).await?.error_for_status(url)?;
        let raw: serde_json::Value = response.json()?;
        normalize_stats(username, &raw, Utc::now())
            .ok_or_else(|| AppError::parse(format!("stats for {username}"), "unexpected response shape"))
    }

    /// Whether the API answers with 2xx for `username`.
    pub async fn probe(&self, username: &str) -> bool {
        let url = match self.query_url(username) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Invalid stats URL: {e}");
                return false;
            }
        };
        match self.transport.get(&url).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                log::warn!("Stats API connection test failed: {e}");
                false
            }
        }
    }
}
