//! Service layer for the monitor.
//!
//! This module contains the outbound integrations:
//! - Timeline fetching with mirror failover (`TimelineFetcher`)
//! - Timeline page parsing (`NitterParser`)
//! - Stats API access and normalization (`StatsClient`)
//! - Webhook delivery (`WebhookNotifier`)

pub mod normalize;
pub mod notifier;
pub mod parser;
pub mod stats;
pub mod timeline;

pub use normalize::normalize_stats;
pub use notifier::WebhookNotifier;
pub use parser::{NitterParser, PageParser};
pub use stats::StatsClient;
pub use timeline::{MirrorProbe, TimelineFetcher};
