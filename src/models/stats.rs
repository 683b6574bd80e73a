//! Account statistics snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time capture of an account's aggregate statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub username: String,
    pub followers: u64,
    pub following: u64,
    pub tweet_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_24h: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_7d: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_30d: Option<i64>,

    pub captured_at: DateTime<Utc>,
}

impl StatsSnapshot {
    /// Snapshot with all counters at zero.
    pub fn empty(username: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            followers: 0,
            following: 0,
            tweet_count: 0,
            verified: None,
            description: None,
            profile_image_url: None,
            growth_24h: None,
            growth_7d: None,
            growth_30d: None,
            captured_at,
        }
    }

    /// `following / max(followers, 1)`
    pub fn following_to_followers_ratio(&self) -> f64 {
        self.following as f64 / self.followers.max(1) as f64
    }

    /// Whether the tracked counters match, ignoring capture time and profile text.
    pub fn same_counters(&self, other: &StatsSnapshot) -> bool {
        self.followers == other.followers
            && self.following == other.following
            && self.tweet_count == other.tweet_count
    }
}

/// Difference between two snapshots of the same account.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsDelta {
    pub previous: StatsSnapshot,
    pub current: StatsSnapshot,
}

impl StatsDelta {
    pub fn new(previous: StatsSnapshot, current: StatsSnapshot) -> Self {
        Self { previous, current }
    }

    pub fn followers_change(&self) -> i64 {
        signed_change(self.previous.followers, self.current.followers)
    }

    pub fn following_change(&self) -> i64 {
        signed_change(self.previous.following, self.current.following)
    }

    pub fn tweet_count_change(&self) -> i64 {
        signed_change(self.previous.tweet_count, self.current.tweet_count)
    }
}

fn signed_change(previous: u64, current: u64) -> i64 {
    let previous = i64::try_from(previous).unwrap_or(i64::MAX);
    let current = i64::try_from(current).unwrap_or(i64::MAX);
    current.saturating_sub(previous)
}
