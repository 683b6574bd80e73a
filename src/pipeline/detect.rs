//! Change detection against persisted state.
//!
//! Decides which fetched tweets are new and whether the account statistics
//! moved since the last persisted snapshot. Pure: nothing here touches the
//! network or the store.

use crate::models::{MonitorState, StatsDelta, StatsSnapshot, TweetId, TweetRecord};

/// Outcome of comparing a candidate window with the stored marker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TweetDetection {
    /// Records to notify, newest first
    pub new_records: Vec<TweetRecord>,
    /// Marker to persist once the new records are handled
    pub marker: Option<TweetId>,
}

impl TweetDetection {
    pub fn has_new(&self) -> bool {
        !self.new_records.is_empty()
    }
}

/// Outcome of comparing a fresh snapshot with the stored one.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsChange {
    /// No prior snapshot. Persisted; alerted only when `alert` is set.
    Baseline { snapshot: StatsSnapshot, alert: bool },
    /// Followers moved.
    Changed(StatsDelta),
    /// Followers are the same. `secondary_changed` tells whether anything
    /// else worth persisting moved.
    Unchanged {
        snapshot: StatsSnapshot,
        secondary_changed: bool,
    },
}

impl StatsChange {
    /// Snapshot that should end up in the store.
    pub fn snapshot(&self) -> &StatsSnapshot {
        match self {
            StatsChange::Baseline { snapshot, .. } => snapshot,
            StatsChange::Changed(delta) => &delta.current,
            StatsChange::Unchanged { snapshot, .. } => snapshot,
        }
    }

    /// Movement against the stored snapshot, when there is any.
    pub fn delta(&self) -> Option<&StatsDelta> {
        match self {
            StatsChange::Changed(delta) => Some(delta),
            _ => None,
        }
    }

    pub fn should_alert(&self) -> bool {
        match self {
            StatsChange::Baseline { alert, .. } => *alert,
            StatsChange::Changed(_) => true,
            StatsChange::Unchanged { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    /// Treat the whole first window as new when no marker exists
    pub push_all_on_first_run: bool,
    /// Alert on the very first stats snapshot
    pub notify_on_first_stats: bool,
}

impl ChangeDetector {
    pub fn new(push_all_on_first_run: bool, notify_on_first_stats: bool) -> Self {
        Self {
            push_all_on_first_run,
            notify_on_first_stats,
        }
    }

    /// Determine which candidates are newer than the stored marker.
    ///
    /// Candidates may arrive in any order. When the marker has scrolled out of
    /// the window only the newest candidate is reported, and only if it is
    /// newer than the marker. The marker never moves backwards.
    pub fn detect_new_tweets(
        &self,
        state: &MonitorState,
        candidates: &[TweetRecord],
    ) -> TweetDetection {
        let mut sorted: Vec<&TweetRecord> = candidates.iter().collect();
        sorted.sort_by(|a, b| b.id.cmp(&a.id));
        sorted.dedup_by(|a, b| a.id == b.id);

        let Some(newest) = sorted.first() else {
            return TweetDetection {
                new_records: Vec::new(),
                marker: state.last_tweet_id.clone(),
            };
        };

        let new_records: Vec<TweetRecord> = match &state.last_tweet_id {
            None if self.push_all_on_first_run => sorted.iter().map(|r| (*r).clone()).collect(),
            None => {
                log::info!(
                    "First run for @{}: baselining at {} without notifying",
                    newest.author,
                    newest.id
                );
                Vec::new()
            }
            Some(marker) if sorted.iter().any(|r| &r.id == marker) => sorted
                .iter()
                .take_while(|r| &r.id != marker)
                .map(|r| (*r).clone())
                .collect(),
            Some(marker) if &newest.id > marker => {
                log::warn!(
                    "Marker {} not in the fetched window for @{}; reporting only {}",
                    marker,
                    newest.author,
                    newest.id
                );
                vec![(*newest).clone()]
            }
            Some(_) => Vec::new(),
        };

        let marker = match &state.last_tweet_id {
            Some(marker) if marker >= &newest.id => Some(marker.clone()),
            _ => Some(newest.id.clone()),
        };

        TweetDetection {
            new_records,
            marker,
        }
    }

    /// Compare a fresh snapshot with the stored one.
    pub fn detect_stats_change(&self, state: &MonitorState, snapshot: StatsSnapshot) -> StatsChange {
        match &state.last_stats {
            None => StatsChange::Baseline {
                snapshot,
                alert: self.notify_on_first_stats,
            },
            Some(previous) if previous.followers != snapshot.followers => {
                StatsChange::Changed(StatsDelta::new(previous.clone(), snapshot))
            }
            Some(previous) => {
                let secondary_changed = !previous.same_counters(&snapshot)
                    || previous.verified != snapshot.verified
                    || previous.description != snapshot.description
                    || previous.growth_24h != snapshot.growth_24h;
                StatsChange::Unchanged {
                    snapshot,
                    secondary_changed,
                }
            }
        }
    }
}
