// src/models/mod.rs

//! Domain models for the monitor.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod notification;
mod state;
mod stats;
mod tweet;

// Re-export all public types
pub use config::{
    Config, HttpConfig, LoggingConfig, MIN_INTERVAL_MINUTES, MonitorConfig, NitterConfig,
    StatsConfig, StorageConfig, WebhookConfig,
};
pub use notification::{
    MarkdownContent, Mention, MessageBody, MessageFormat, NotificationJob, NotificationKind,
    TextContent, WebhookPayload,
};
pub use state::MonitorState;
pub use stats::{StatsDelta, StatsSnapshot};
pub use tweet::{TweetId, TweetRecord};
