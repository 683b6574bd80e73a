//! Rendering of change events into webhook payloads.
//!
//! Every message is first laid out as a list of [`Line`]s and then rendered
//! for the configured [`MessageFormat`], so text and markdown output always
//! carry the same information.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;
use crate::models::{
    Config, Mention, MessageFormat, StatsDelta, StatsSnapshot, TweetRecord, WebhookPayload,
};

pub const DEFAULT_MAX_CONTENT_CHARS: usize = 300;
pub const DEFAULT_MAX_MEDIA: usize = 3;

const FOOTER: &str = "Sent by xmonitor";

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Heading(String),
    Field(String, String),
    Link {
        label: String,
        text: String,
        url: String,
    },
    Item {
        index: usize,
        text: String,
        url: String,
    },
    Divider,
    Footer(String),
}

impl Line {
    fn field(label: &str, value: impl Into<String>) -> Self {
        Line::Field(label.to_string(), value.into())
    }

    fn link(label: &str, text: impl Into<String>, url: impl Into<String>) -> Self {
        Line::Link {
            label: label.to_string(),
            text: text.into(),
            url: url.into(),
        }
    }

    fn markdown(&self) -> String {
        match self {
            Line::Heading(text) => format!("## {text}"),
            Line::Field(label, value) => format!("**{label}**: {value}"),
            Line::Link { label, text, url } => format!("**{label}**: [{text}]({url})"),
            Line::Item { index, text, url } => format!("{index}. [{text}]({url})"),
            Line::Divider => "---".to_string(),
            Line::Footer(text) => format!("*{text}*"),
        }
    }

    fn text(&self) -> String {
        match self {
            Line::Heading(text) => text.clone(),
            Line::Field(label, value) => format!("{label}: {value}"),
            Line::Link { label, url, .. } => format!("{label}: {url}"),
            Line::Item { index, url, .. } => format!("{index}. {url}"),
            Line::Divider => "----".to_string(),
            Line::Footer(text) => text.clone(),
        }
    }
}

/// Builds webhook payloads. Pure and deterministic for a given input.
#[derive(Debug, Clone)]
pub struct NotificationComposer {
    timezone: Tz,
    format: MessageFormat,
    mention: Mention,
    max_content_chars: usize,
    max_media: usize,
}

impl NotificationComposer {
    pub fn new(timezone: Tz, format: MessageFormat, mention: Mention) -> Self {
        Self {
            timezone,
            format,
            mention,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
            max_media: DEFAULT_MAX_MEDIA,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let webhook = &config.webhook;
        Ok(Self::new(
            config.timezone()?,
            webhook.format,
            Mention {
                at_mobiles: webhook.at_mobiles.clone(),
                is_at_all: webhook.at_all,
            },
        )
        .with_limits(webhook.max_content_chars, webhook.max_media))
    }

    pub fn with_limits(mut self, max_content_chars: usize, max_media: usize) -> Self {
        self.max_content_chars = max_content_chars;
        self.max_media = max_media;
        self
    }

    /// New-tweet alert, optionally followed by the account's last known stats.
    pub fn compose_tweet(&self, record: &TweetRecord, stats: Option<&StatsSnapshot>) -> WebhookPayload {
        let mut lines = vec![
            Line::Heading("🐦 New tweet".to_string()),
            Line::field("Account", format!("@{}", record.author)),
        ];
        if !record.published_at.is_empty() {
            lines.push(Line::field("Time", record.published_at.clone()));
        }
        lines.push(Line::field(
            "Content",
            truncate_graphemes(&record.content, self.max_content_chars),
        ));
        lines.push(Line::link("Link", "View tweet", record.canonical_url()));

        if !record.media_urls.is_empty() {
            lines.push(Line::field("Media", record.media_urls.len().to_string()));
            lines.extend(
                record
                    .media_urls
                    .iter()
                    .take(self.max_media)
                    .enumerate()
                    .map(|(i, url)| Line::Item {
                        index: i + 1,
                        text: "Media link".to_string(),
                        url: url.clone(),
                    }),
            );
        }

        if let Some(stats) = stats {
            lines.push(Line::Divider);
            lines.push(Line::field("Followers", group_thousands(stats.followers)));
            lines.push(Line::field("Following", group_thousands(stats.following)));
            lines.push(Line::field("Tweets", group_thousands(stats.tweet_count)));
            if let Some(growth) = stats.growth_24h {
                lines.push(Line::field(
                    "24h growth",
                    format!("{} {}", indicator(growth), format_signed(growth)),
                ));
            }
        }

        lines.push(Line::Footer(FOOTER.to_string()));
        self.render(&format!("@{} posted a new tweet", record.author), &lines)
    }

    /// Stats update. `delta` adds signed changes against the previous snapshot.
    pub fn compose_stats(
        &self,
        username: &str,
        current: &StatsSnapshot,
        delta: Option<&StatsDelta>,
    ) -> WebhookPayload {
        let counter = |label: &str, now: u64, change: Option<i64>| {
            let value = match change {
                Some(change) if change != 0 => {
                    format!(
                        "{} ({} {})",
                        group_thousands(now),
                        indicator(change),
                        format_signed(change)
                    )
                }
                _ => group_thousands(now),
            };
            Line::field(label, value)
        };

        let mut lines = vec![
            Line::Heading(format!("📊 @{username} stats")),
            Line::field("Captured", self.local_time(current.captured_at)),
            counter("Followers", current.followers, delta.map(StatsDelta::followers_change)),
            counter("Following", current.following, delta.map(StatsDelta::following_change)),
            counter("Tweets", current.tweet_count, delta.map(StatsDelta::tweet_count_change)),
            Line::field(
                "Following/followers",
                format!("{:.2}", current.following_to_followers_ratio()),
            ),
        ];

        for (label, growth) in [
            ("24h growth", current.growth_24h),
            ("7d growth", current.growth_7d),
            ("30d growth", current.growth_30d),
        ] {
            if let Some(growth) = growth {
                lines.push(Line::field(
                    label,
                    format!("{} {}", indicator(growth), format_signed(growth)),
                ));
            }
        }

        if current.verified == Some(true) {
            lines.push(Line::field("Verified", "yes"));
        }
        lines.push(Line::link(
            "Profile",
            format!("View @{username}"),
            format!("https://x.com/{username}"),
        ));
        lines.push(Line::Footer(FOOTER.to_string()));

        self.render(&format!("@{username} stats update"), &lines)
    }

    /// Announces that monitoring has begun.
    pub fn compose_startup(
        &self,
        now: DateTime<Utc>,
        usernames: &[String],
        tweet_interval_minutes: u64,
        stats_interval_minutes: Option<u64>,
    ) -> WebhookPayload {
        let accounts = usernames
            .iter()
            .map(|u| format!("@{u}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut lines = vec![
            Line::Heading("🚀 X monitor started".to_string()),
            Line::field("Accounts", accounts),
            Line::field(
                "Tweet check",
                format!("every {tweet_interval_minutes} min"),
            ),
        ];
        if let Some(minutes) = stats_interval_minutes {
            lines.push(Line::field("Stats check", format!("every {minutes} min")));
        }
        lines.push(Line::field("Started", self.local_time(now)));
        lines.push(Line::Footer(FOOTER.to_string()));
        self.render("X monitor started", &lines)
    }

    pub fn compose_shutdown(&self, now: DateTime<Utc>) -> WebhookPayload {
        let lines = [
            Line::Heading("🛑 X monitor stopped".to_string()),
            Line::field("Stopped", self.local_time(now)),
            Line::Footer(FOOTER.to_string()),
        ];
        self.render("X monitor stopped", &lines)
    }

    /// Test message sent by the `test-webhook` command.
    pub fn compose_probe(&self, now: DateTime<Utc>) -> WebhookPayload {
        let lines = [
            Line::Heading("✅ Webhook test".to_string()),
            Line::field("Sent", self.local_time(now)),
            Line::Footer(FOOTER.to_string()),
        ];
        self.render("Webhook test", &lines)
    }

    fn local_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string()
    }

    fn render(&self, title: &str, lines: &[Line]) -> WebhookPayload {
        match self.format {
            MessageFormat::Markdown => {
                let text = lines.iter().map(Line::markdown).collect::<Vec<_>>().join("\n\n");
                WebhookPayload::markdown(title, text, self.mention.clone())
            }
            MessageFormat::Text => {
                let text = lines.iter().map(Line::text).collect::<Vec<_>>().join("\n");
                WebhookPayload::text(text, self.mention.clone())
            }
        }
    }
}

/// Cut `s` to at most `max` grapheme clusters, marking the cut with `…`.
pub fn truncate_graphemes(s: &str, max: usize) -> String {
    let mut graphemes = s.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// `1234567` → `1,234,567`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Explicit sign and thousands separators: `+1,200`, `-5`, `0`.
pub fn format_signed(n: i64) -> String {
    let magnitude = group_thousands(n.unsigned_abs());
    match n.signum() {
        1 => format!("+{magnitude}"),
        -1 => format!("-{magnitude}"),
        _ => magnitude,
    }
}

pub fn indicator(change: i64) -> &'static str {
    match change.signum() {
        1 => "📈",
        -1 => "📉",
        _ => "➖",
    }
}
