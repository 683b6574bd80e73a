//! Monitor wiring: the tweet check, the stats check, health and lifecycle
//! notifications.
//!
//! ## Cycle
//!
//! ```text
//! load state ─► fetch ─► detect ─► compose ─► deliver ─► save state
//! ```
//!
//! Each username is processed under its own async lock, and a failure for one
//! username never stops the others.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{AppError, Result};
use crate::models::{
    Config, MonitorState, NotificationJob, NotificationKind, StatsSnapshot, WebhookPayload,
};
use crate::pipeline::compose::NotificationComposer;
use crate::pipeline::detect::{ChangeDetector, StatsChange};
use crate::services::{NitterParser, StatsClient, TimelineFetcher, WebhookNotifier};
use crate::storage::{LocalStateStore, StateStore};
use crate::utils::http::{HttpTransport, ReqwestTransport};
use crate::utils::retry::RetryPolicy;

/// Summary of one pass over all usernames.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub checked: usize,
    /// New tweets or stats changes found
    pub detected: usize,
    /// Notifications accepted by the webhook
    pub delivered: usize,
    /// Usernames whose check failed, with the reason
    pub failures: Vec<(String, String)>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, username: &str, result: Result<(usize, usize)>) {
        self.checked += 1;
        match result {
            Ok((detected, delivered)) => {
                self.detected += detected;
                self.delivered += delivered;
            }
            Err(e) => {
                log::error!("Check failed for @{username}: {e}");
                self.failures.push((username.to_string(), e.to_string()));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Degraded => f.write_str("degraded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    fn from_components(components: Vec<ComponentHealth>) -> Self {
        let status = if components.iter().all(|c| c.healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            checked_at: Utc::now(),
            components,
        }
    }
}

pub struct Monitor {
    usernames: Vec<String>,
    max_tweets: usize,
    tweet_interval_minutes: u64,
    stats_interval_minutes: u64,
    startup_notification: bool,
    timeline: TimelineFetcher,
    stats: Option<StatsClient>,
    notifier: WebhookNotifier,
    composer: NotificationComposer,
    detector: ChangeDetector,
    store: Arc<dyn StateStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Monitor {
    /// Build a monitor over the given transport and store.
    pub fn new(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        let http = &config.http;
        let source_retry =
            RetryPolicy::linear(http.max_retries, Duration::from_secs(http.retry_delay_secs));
        let stats_retry = RetryPolicy::exponential(http.max_retries, Duration::from_secs(1));
        let webhook_retry = RetryPolicy::exponential(
            config.webhook.max_retries,
            Duration::from_secs(config.webhook.retry_base_secs),
        );

        let timeline = TimelineFetcher::new(
            Arc::clone(&transport),
            Arc::new(NitterParser::new()?),
            &config.nitter,
            source_retry,
        );
        let stats = config.stats.enabled.then(|| {
            StatsClient::new(Arc::clone(&transport), config.stats.url.clone(), stats_retry)
        });
        let notifier = WebhookNotifier::new(transport, &config.webhook, webhook_retry);

        Ok(Self {
            usernames: config.monitor.usernames.clone(),
            max_tweets: config.monitor.max_tweets,
            tweet_interval_minutes: config.monitor.tweet_interval_minutes,
            stats_interval_minutes: config.monitor.stats_interval_minutes,
            startup_notification: config.monitor.startup_notification,
            timeline,
            stats,
            notifier,
            composer: NotificationComposer::from_config(config)?,
            detector: ChangeDetector::new(
                config.monitor.push_all_on_first_run,
                config.stats.notify_on_first_snapshot,
            ),
            store,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Production wiring: `reqwest` transport and per-account JSON files.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config.http)?);
        let store = Arc::new(LocalStateStore::new(&config.storage.state_dir));
        Self::new(config, transport, store)
    }

    pub fn usernames(&self) -> &[String] {
        &self.usernames
    }

    pub fn stats_enabled(&self) -> bool {
        self.stats.is_some()
    }

    async fn lock_for(&self, username: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(username.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Run the tweet check for every username.
    pub async fn check_tweets(&self) -> CycleReport {
        let mut report = CycleReport::default();
        for username in &self.usernames {
            let result = self.check_tweets_for(username).await;
            report.record(username, result);
        }
        log::info!(
            "Tweet check done: {} accounts, {} new, {} delivered, {} failed",
            report.checked,
            report.detected,
            report.delivered,
            report.failures.len()
        );
        report
    }

    /// Tweet check for one username. Returns `(detected, delivered)`.
    ///
    /// New tweets go out oldest first and the marker advances after each
    /// accepted message, so a failed delivery is retried next cycle without
    /// repeating the ones already sent.
    pub async fn check_tweets_for(&self, username: &str) -> Result<(usize, usize)> {
        let _guard = self.lock_for(username).await;
        let mut state = self.store.load(username).await?;

        let candidates = self.timeline.fetch_candidates(username, self.max_tweets).await;
        if candidates.is_empty() {
            return Err(AppError::parse(
                format!("timeline of @{username}"),
                "no mirror returned usable tweets",
            ));
        }

        let detection = self.detector.detect_new_tweets(&state, &candidates);
        let detected = detection.new_records.len();
        let mut delivered = 0;
        let mut interrupted = false;

        for record in detection.new_records.iter().rev() {
            let payload = self.composer.compose_tweet(record, state.last_stats.as_ref());
            let mut job = NotificationJob::new(NotificationKind::Tweet, payload);
            if self.notifier.deliver(&mut job).await {
                delivered += 1;
                if state.last_tweet_id.as_ref().is_none_or(|m| &record.id > m) {
                    state.last_tweet_id = Some(record.id.clone());
                }
            } else {
                interrupted = true;
                break;
            }
        }

        if !interrupted {
            state.last_tweet_id = detection.marker;
        }

        if delivered > 0 || !interrupted {
            state.updated_at = Some(Utc::now());
            self.store.save(username, &state).await?;
        }

        if interrupted {
            log::warn!(
                "Delivered {delivered} of {detected} new tweets for @{username}; the rest will be retried"
            );
        } else if detected > 0 {
            log::info!("Delivered {delivered} new tweets for @{username}");
        } else {
            log::debug!("No new tweets for @{username}");
        }
        Ok((detected, delivered))
    }

    /// Run the stats check for every username. A no-op when stats are off.
    pub async fn check_stats(&self) -> CycleReport {
        let mut report = CycleReport::default();
        if self.stats.is_none() {
            log::debug!("Stats check disabled");
            return report;
        }
        for username in &self.usernames {
            let result = self.check_stats_for(username).await;
            report.record(username, result);
        }
        log::info!(
            "Stats check done: {} accounts, {} changed, {} delivered, {} failed",
            report.checked,
            report.detected,
            report.delivered,
            report.failures.len()
        );
        report
    }

    /// Stats check for one username. Returns `(detected, delivered)`.
    ///
    /// A change is persisted only once its alert is delivered; silent
    /// outcomes are persisted right away.
    pub async fn check_stats_for(&self, username: &str) -> Result<(usize, usize)> {
        let _guard = self.lock_for(username).await;
        let mut state = self.store.load(username).await?;
        let snapshot = self.lookup_stats(username).await?;

        let change = self.detector.detect_stats_change(&state, snapshot);
        let detected = usize::from(matches!(change, StatsChange::Changed(_)));

        if change.should_alert() {
            let payload = self
                .composer
                .compose_stats(username, change.snapshot(), change.delta());
            let mut job = NotificationJob::new(NotificationKind::StatsUpdate, payload);
            if !self.notifier.deliver(&mut job).await {
                log::warn!("Stats alert for @{username} not delivered; keeping previous snapshot");
                return Ok((detected, 0));
            }
            self.persist_stats(username, &mut state, change.snapshot().clone())
                .await?;
            return Ok((detected, 1));
        }

        match &change {
            StatsChange::Baseline { .. } => {
                log::info!("Recorded first stats snapshot for @{username}")
            }
            StatsChange::Unchanged {
                secondary_changed: true,
                ..
            } => log::info!("Stats for @{username} changed without follower movement"),
            _ => log::debug!("Stats for @{username} unchanged"),
        }
        self.persist_stats(username, &mut state, change.snapshot().clone())
            .await?;
        Ok((detected, 0))
    }

    async fn persist_stats(
        &self,
        username: &str,
        state: &mut MonitorState,
        snapshot: StatsSnapshot,
    ) -> Result<()> {
        state.last_stats = Some(snapshot);
        state.updated_at = Some(Utc::now());
        self.store.save(username, state).await
    }

    /// Current statistics for `username`, without touching state.
    pub async fn lookup_stats(&self, username: &str) -> Result<StatsSnapshot> {
        match &self.stats {
            Some(client) => client.fetch_stats(username).await,
            None => Err(AppError::config("stats API is disabled")),
        }
    }

    /// Both checks, one after the other.
    pub async fn run_once(&self) -> (CycleReport, CycleReport) {
        let tweets = self.check_tweets().await;
        let stats = self.check_stats().await;
        (tweets, stats)
    }

    /// Probe every collaborator once.
    pub async fn health_check(&self) -> HealthReport {
        let probe_user = self.usernames.first().map(String::as_str).unwrap_or("x");

        let (mirrors, stats_ok, webhook_ok, store_result) = futures::join!(
            self.timeline.probe_mirrors(probe_user),
            async {
                match &self.stats {
                    Some(client) => Some(client.probe(probe_user).await),
                    None => None,
                }
            },
            self.notifier.probe(),
            self.store.load(probe_user),
        );

        let reachable = mirrors.iter().filter(|m| m.reachable).count();
        let mut components = vec![ComponentHealth {
            name: "nitter".into(),
            healthy: reachable > 0,
            detail: format!("{reachable}/{} mirrors reachable", mirrors.len()),
        }];
        if let Some(ok) = stats_ok {
            components.push(ComponentHealth {
                name: "stats".into(),
                healthy: ok,
                detail: if ok { "reachable" } else { "unreachable" }.into(),
            });
        }
        components.push(ComponentHealth {
            name: "webhook".into(),
            healthy: webhook_ok,
            detail: if webhook_ok { "reachable" } else { "unreachable" }.into(),
        });
        components.push(ComponentHealth {
            name: "storage".into(),
            healthy: store_result.is_ok(),
            detail: match store_result {
                Ok(_) => "readable".to_string(),
                Err(e) => e.to_string(),
            },
        });

        let report = HealthReport::from_components(components);
        log::info!("Health check: {}", report.status);
        report
    }

    /// Announce startup, when enabled. Returns whether a message went out.
    pub async fn notify_startup(&self, now: DateTime<Utc>) -> bool {
        if !self.startup_notification {
            return false;
        }
        let payload = self.composer.compose_startup(
            now,
            &self.usernames,
            self.tweet_interval_minutes,
            self.stats.as_ref().map(|_| self.stats_interval_minutes),
        );
        self.send_system(payload).await
    }

    /// Best-effort stop message. Failure is logged and otherwise ignored.
    pub async fn notify_shutdown(&self, now: DateTime<Utc>) {
        let payload = self.composer.compose_shutdown(now);
        if !self.send_system(payload).await {
            log::warn!("Stop notification was not delivered");
        }
    }

    /// Send a test message through the webhook.
    pub async fn send_test_message(&self, now: DateTime<Utc>) -> bool {
        let payload = self.composer.compose_probe(now);
        self.send_system(payload).await
    }

    async fn send_system(&self, payload: WebhookPayload) -> bool {
        let mut job = NotificationJob::new(NotificationKind::System, payload);
        self.notifier.deliver(&mut job).await
    }
}
