//! Tweet data structures.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric tweet identifier kept in its string form.
///
/// Snowflake ids overflow naive lexicographic comparison ("99" > "100"), so
/// ordering compares the digit count first and the digits second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TweetId(String);

impl TweetId {
    /// Wrap an id, rejecting anything that is not a run of ASCII digits.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits = trimmed.trim_start_matches('0');
        let digits = if digits.is_empty() { "0" } else { digits };
        Some(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for TweetId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for TweetId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TweetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tweet scraped from a timeline mirror.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TweetRecord {
    /// Status id, the ordering key
    pub id: TweetId,

    /// Handle of the posting account, without `@`
    pub author: String,

    /// Plain-text body
    pub content: String,

    /// Publication time as reported by the mirror
    pub published_at: String,

    /// Canonical link to the post
    pub url: String,

    /// Attached media, in page order
    #[serde(default)]
    pub media_urls: Vec<String>,
}

impl TweetRecord {
    /// Link to the post on x.com, independent of the mirror it came from.
    pub fn canonical_url(&self) -> String {
        format!("https://x.com/{}/status/{}", self.author, self.id)
    }
}
