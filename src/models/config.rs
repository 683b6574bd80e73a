//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::MessageFormat;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Accounts to watch and check cadence
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// HTTP client, retry and proxy settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Timeline mirrors
    #[serde(default)]
    pub nitter: NitterConfig,

    /// Statistics API
    #[serde(default)]
    pub stats: StatsConfig,

    /// Chat webhook
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// State persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// A variable that is set but does not parse is an error, never a silent
    /// fallback to the file or default value.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| var(key).map(|v| v.trim().eq_ignore_ascii_case("true"));

        if let Some(users) = var("X_USERNAMES").or_else(|| var("X_USERNAME")) {
            self.monitor.usernames = split_list(&users);
        }
        if let Some(minutes) = parse_var(&var, "CHECK_INTERVAL")? {
            self.monitor.tweet_interval_minutes = minutes;
        }
        if let Some(minutes) = parse_var(&var, "STATS_INTERVAL")? {
            self.monitor.stats_interval_minutes = minutes;
        }
        if let Some(count) = parse_var(&var, "MAX_TWEETS")? {
            self.monitor.max_tweets = count;
        }
        if let Some(push_all) = flag("ON_FIRST_RUN_PUSH_ALL") {
            self.monitor.push_all_on_first_run = push_all;
        }
        if let Some(tz) = var("TIMEZONE") {
            self.monitor.timezone = tz.trim().to_string();
        }
        if let Some(enabled) = flag("STARTUP_NOTIFICATION") {
            self.monitor.startup_notification = enabled;
        }

        if let Some(secs) = parse_var(&var, "REQUEST_TIMEOUT")? {
            self.http.timeout_secs = secs;
        }
        if let Some(retries) = parse_var(&var, "MAX_RETRIES")? {
            self.http.max_retries = retries;
        }
        if let Some(secs) = parse_var(&var, "RETRY_DELAY")? {
            self.http.retry_delay_secs = secs;
        }
        let proxy = [
            "HTTPS_PROXY",
            "https_proxy",
            "HTTP_PROXY",
            "http_proxy",
            "PROXY_HTTPS",
            "PROXY_HTTP",
        ]
        .into_iter()
        .find_map(|key| var(key));
        if let Some(proxy) = proxy {
            self.http.proxy = Some(proxy.trim().to_string());
        }

        if let Some(mirrors) = var("NITTER_BASE_URLS") {
            self.nitter.mirrors = split_list(&mirrors);
        }

        // An explicitly empty XTRACKER_URL switches the stats check off.
        if let Some(url) = lookup("XTRACKER_URL") {
            if url.trim().is_empty() {
                self.stats.enabled = false;
            } else {
                self.stats.enabled = true;
                self.stats.url = url.trim().to_string();
            }
        }

        if let Some(url) = var("DINGTALK_WEBHOOK_URL") {
            self.webhook.base_url = url.trim().to_string();
        }
        if let Some(token) = var("DINGTALK_ACCESS_TOKEN") {
            self.webhook.access_token = token.trim().to_string();
        }
        if let Some(secret) = var("DINGTALK_SECRET") {
            self.webhook.secret = Some(secret.trim().to_string());
        }
        if let Some(format) = var("MESSAGE_FORMAT") {
            self.webhook.format = format
                .parse()
                .map_err(|e| AppError::validation(format!("MESSAGE_FORMAT: {e}")))?;
        }

        if let Some(dir) = var("STATE_DIR") {
            self.storage.state_dir = dir.trim().to_string();
        }

        if flag("DEBUG") == Some(true) {
            self.logging.level = "debug".into();
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
        Ok(())
    }

    /// Validate configuration values. Any failure here is fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.webhook.access_token.trim().is_empty() {
            return Err(AppError::validation(
                "webhook.access_token is required (DINGTALK_ACCESS_TOKEN)",
            ));
        }
        if self.webhook.base_url.trim().is_empty() {
            return Err(AppError::validation("webhook.base_url is empty"));
        }
        url::Url::parse(&self.webhook.base_url)
            .map_err(|e| AppError::validation(format!("webhook.base_url: {e}")))?;
        if self.webhook.max_retries == 0 {
            return Err(AppError::validation("webhook.max_retries must be > 0"));
        }
        if self.monitor.usernames.is_empty() {
            return Err(AppError::validation("No usernames to monitor"));
        }
        if self.monitor.usernames.iter().any(|u| u.trim().is_empty()) {
            return Err(AppError::validation("monitor.usernames contains a blank entry"));
        }
        if self.monitor.tweet_interval_minutes < MIN_INTERVAL_MINUTES {
            return Err(AppError::validation(format!(
                "monitor.tweet_interval_minutes must be >= {MIN_INTERVAL_MINUTES}"
            )));
        }
        if self.monitor.stats_interval_minutes < MIN_INTERVAL_MINUTES {
            return Err(AppError::validation(format!(
                "monitor.stats_interval_minutes must be >= {MIN_INTERVAL_MINUTES}"
            )));
        }
        if self.monitor.tweet_interval_minutes > MAX_INTERVAL_MINUTES
            || self.monitor.stats_interval_minutes > MAX_INTERVAL_MINUTES
        {
            return Err(AppError::validation(format!(
                "check intervals must be <= {MAX_INTERVAL_MINUTES} minutes"
            )));
        }
        if self.monitor.max_tweets == 0 {
            return Err(AppError::validation("monitor.max_tweets must be > 0"));
        }
        self.timezone()?;
        if self.webhook.max_content_chars == 0 {
            return Err(AppError::validation("webhook.max_content_chars must be > 0"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.max_retries == 0 {
            return Err(AppError::validation("http.max_retries must be > 0"));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.nitter.mirrors.is_empty() {
            return Err(AppError::validation("No Nitter mirrors defined"));
        }
        for mirror in &self.nitter.mirrors {
            url::Url::parse(mirror)
                .map_err(|e| AppError::validation(format!("Invalid mirror '{mirror}': {e}")))?;
        }
        if self.stats.enabled {
            self.validate_stats()?;
        }
        Ok(())
    }

    /// Checks needed before querying the stats API on its own.
    pub fn validate_stats(&self) -> Result<()> {
        if !self.stats.enabled {
            return Err(AppError::validation(
                "stats API is disabled (XTRACKER_URL is empty)",
            ));
        }
        url::Url::parse(&self.stats.url)
            .map_err(|e| AppError::validation(format!("stats.url: {e}")))?;
        Ok(())
    }

    /// Configured timezone for rendering timestamps.
    pub fn timezone(&self) -> Result<Tz> {
        self.monitor
            .timezone
            .parse::<Tz>()
            .map_err(|_| AppError::validation(format!("Invalid timezone: {}", self.monitor.timezone)))
    }
}

/// Lower bound for both check intervals.
pub const MIN_INTERVAL_MINUTES: u64 = 1;

/// Upper bound for both check intervals (one week).
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Parse a set variable, naming it in the error when it does not parse.
fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    var(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| AppError::validation(format!("{key}: invalid value '{}'", raw.trim())))
        })
        .transpose()
}

/// Accounts and check cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Handles to watch, without `@`
    #[serde(default = "defaults::usernames")]
    pub usernames: Vec<String>,

    /// Minutes between timeline checks
    #[serde(default = "defaults::tweet_interval")]
    pub tweet_interval_minutes: u64,

    /// Minutes between stats checks
    #[serde(default = "defaults::stats_interval")]
    pub stats_interval_minutes: u64,

    /// Candidates kept per timeline fetch
    #[serde(default = "defaults::max_tweets")]
    pub max_tweets: usize,

    /// Alert on every fetched tweet when no marker exists yet
    #[serde(default)]
    pub push_all_on_first_run: bool,

    /// IANA timezone for rendered timestamps
    #[serde(default = "defaults::timezone")]
    pub timezone: String,

    /// Send a message when the service starts
    #[serde(default = "defaults::enabled")]
    pub startup_notification: bool,
}

impl MonitorConfig {
    pub fn tweet_interval(&self) -> Duration {
        Duration::from_secs(self.tweet_interval_minutes.saturating_mul(60))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_minutes.saturating_mul(60))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            usernames: defaults::usernames(),
            tweet_interval_minutes: defaults::tweet_interval(),
            stats_interval_minutes: defaults::stats_interval(),
            max_tweets: defaults::max_tweets(),
            push_all_on_first_run: false,
            timezone: defaults::timezone(),
            startup_notification: true,
        }
    }
}

/// HTTP client and retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per source before giving up
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base delay between mirror attempts in seconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_secs: u64,

    /// Proxy URL applied to all requests
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            retry_delay_secs: defaults::retry_delay(),
            proxy: None,
        }
    }
}

/// Timeline mirror settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NitterConfig {
    /// Interchangeable Nitter instances
    #[serde(default = "defaults::mirrors")]
    pub mirrors: Vec<String>,

    /// Randomize mirror order every fetch
    #[serde(default = "defaults::enabled")]
    pub shuffle: bool,
}

impl Default for NitterConfig {
    fn default() -> Self {
        Self {
            mirrors: defaults::mirrors(),
            shuffle: true,
        }
    }
}

/// Statistics API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Endpoint; `username` is appended as a query parameter
    #[serde(default = "defaults::stats_url")]
    pub url: String,

    /// Alert on the very first snapshot of an account
    #[serde(default)]
    pub notify_on_first_snapshot: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: defaults::stats_url(),
            notify_on_first_snapshot: false,
        }
    }
}

/// Chat webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "defaults::webhook_url")]
    pub base_url: String,

    #[serde(default)]
    pub access_token: String,

    /// Signing secret for robots with signature verification enabled
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff in seconds
    #[serde(default = "defaults::webhook_retry_base")]
    pub retry_base_secs: u64,

    #[serde(default)]
    pub format: MessageFormat,

    /// Graphemes of post content kept in an alert
    #[serde(default = "defaults::max_content_chars")]
    pub max_content_chars: usize,

    /// Media links listed per alert
    #[serde(default = "defaults::max_media")]
    pub max_media: usize,

    #[serde(default)]
    pub at_mobiles: Vec<String>,

    #[serde(default)]
    pub at_all: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::webhook_url(),
            access_token: String::new(),
            secret: None,
            max_retries: defaults::max_retries(),
            retry_base_secs: defaults::webhook_retry_base(),
            format: MessageFormat::default(),
            max_content_chars: defaults::max_content_chars(),
            max_media: defaults::max_media(),
            at_mobiles: Vec::new(),
            at_all: false,
        }
    }
}

/// State persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::state_dir")]
    pub state_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: defaults::state_dir(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('@').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

mod defaults {
    pub fn usernames() -> Vec<String> {
        vec!["elonmusk".into()]
    }
    pub fn tweet_interval() -> u64 {
        5
    }
    pub fn stats_interval() -> u64 {
        60
    }
    pub fn max_tweets() -> usize {
        10
    }
    pub fn timezone() -> String {
        "Asia/Shanghai".into()
    }
    pub fn enabled() -> bool {
        true
    }

    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        5
    }

    pub fn mirrors() -> Vec<String> {
        vec![
            "https://nitter.poast.org".into(),
            "https://nitter.privacydev.net".into(),
            "https://nitter.net".into(),
        ]
    }

    pub fn stats_url() -> String {
        "https://www.xtracker.io/api/users?stats=true&platform=X".into()
    }

    pub fn webhook_url() -> String {
        "https://oapi.dingtalk.com/robot/send".into()
    }
    pub fn webhook_retry_base() -> u64 {
        1
    }
    pub fn max_content_chars() -> usize {
        300
    }
    pub fn max_media() -> usize {
        3
    }

    pub fn state_dir() -> String {
        "data/state".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.webhook.access_token = "token".into();
        config
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn validate_default_requires_token() {
        assert!(Config::default().validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_interval() {
        let mut config = valid_config();
        config.monitor.tweet_interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_timezone() {
        let mut config = valid_config();
        config.monitor.timezone = "Mars/Olympus_Mons".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid timezone"));
    }

    #[test]
    fn validate_rejects_empty_mirrors() {
        let mut config = valid_config();
        config.nitter.mirrors.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let mut config = valid_config();
        config.http.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[
                ("DINGTALK_ACCESS_TOKEN", "abc"),
                ("DINGTALK_SECRET", "SEC123"),
                ("X_USERNAME", "@jack, dorsey"),
                ("NITTER_BASE_URLS", "https://a.example, https://b.example"),
                ("ON_FIRST_RUN_PUSH_ALL", "TRUE"),
                ("REQUEST_TIMEOUT", "10"),
                ("CHECK_INTERVAL", "2"),
                ("HTTP_PROXY", "http://127.0.0.1:7890"),
                ("LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();

        assert_eq!(config.webhook.access_token, "abc");
        assert_eq!(config.webhook.secret.as_deref(), Some("SEC123"));
        assert_eq!(config.monitor.usernames, vec!["jack", "dorsey"]);
        assert_eq!(
            config.nitter.mirrors,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(config.monitor.push_all_on_first_run);
        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.monitor.tweet_interval_minutes, 2);
        assert_eq!(config.http.proxy.as_deref(), Some("http://127.0.0.1:7890"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_stats_url_disables_stats() {
        let mut config = valid_config();
        config.apply_env_with(env(&[("XTRACKER_URL", "")])).unwrap();
        assert!(!config.stats.enabled);
    }

    #[test]
    fn validate_stats_checks_url_without_token() {
        let mut config = Config::default();
        assert!(config.validate_stats().is_ok());

        config.stats.url = "not a url".into();
        let err = config.validate_stats().unwrap_err();
        assert!(err.to_string().contains("stats.url"));

        config.stats.enabled = false;
        assert!(config.validate_stats().is_err());
    }

    #[test]
    fn env_bad_number_is_fatal() {
        for (key, value) in [
            ("CHECK_INTERVAL", "abc"),
            ("MAX_RETRIES", "-1"),
            ("MAX_TWEETS", "ten"),
        ] {
            let mut config = valid_config();
            let err = config.apply_env_with(env(&[(key, value)])).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            assert!(err.to_string().contains(key), "{err}");
            assert!(err.to_string().contains(value), "{err}");
        }
    }

    #[test]
    fn env_bad_format_is_fatal() {
        let mut config = valid_config();
        let err = config
            .apply_env_with(env(&[("MESSAGE_FORMAT", "html")]))
            .unwrap_err();
        assert!(err.to_string().contains("MESSAGE_FORMAT"));
        assert!(err.to_string().contains("html"));
    }

    #[test]
    fn huge_interval_is_rejected_without_overflow() {
        let huge = u64::MAX.to_string();
        let mut config = valid_config();
        config
            .apply_env_with(env(&[("CHECK_INTERVAL", huge.as_str())]))
            .unwrap();

        assert_eq!(config.monitor.tweet_interval(), Duration::from_secs(u64::MAX));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("check intervals"));
    }

    #[test]
    fn toml_sections_default_when_missing() {
        let config: Config = toml::from_str(
            r#"
            [monitor]
            usernames = ["jack"]

            [webhook]
            access_token = "t"
            format = "text"
            "#,
        )
        .unwrap();

        assert_eq!(config.monitor.usernames, vec!["jack"]);
        assert_eq!(config.monitor.tweet_interval_minutes, 5);
        assert_eq!(config.webhook.format, MessageFormat::Text);
        assert_eq!(config.webhook.max_content_chars, 300);
        assert_eq!(config.webhook.max_media, 3);
        assert_eq!(config.http.max_retries, 3);
        assert!(config.nitter.shuffle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_reads_file_and_reports_bad_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let good = dir.path().join("config.toml");
        fs::write(&good, "[monitor]\nusernames = [\"ev\"]\n").unwrap();
        assert_eq!(Config::load(&good).unwrap().monitor.usernames, vec!["ev"]);

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[monitor\n").unwrap();
        assert!(matches!(Config::load(&bad), Err(AppError::Toml(_))));
        assert!(matches!(
            Config::load(dir.path().join("missing.toml")),
            Err(AppError::Io(_))
        ));
    }
}
