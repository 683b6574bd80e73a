//! Persisted per-account monitor state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{StatsSnapshot, TweetId};

/// Last-seen markers for one monitored account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorState {
    /// Most recent tweet that was notified (or baselined)
    #[serde(default)]
    pub last_tweet_id: Option<TweetId>,

    /// Most recent persisted statistics
    #[serde(default)]
    pub last_stats: Option<StatsSnapshot>,

    /// When this state was last written
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MonitorState {
    /// Whether nothing has ever been recorded for the account.
    pub fn is_fresh(&self) -> bool {
        self.last_tweet_id.is_none() && self.last_stats.is_none()
    }
}
