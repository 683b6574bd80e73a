//! Persistence of per-account monitor state.
//!
//! ## Directory Structure
//!
//! ```text
//! {state_dir}/
//! ├── jack.json         # MonitorState for @jack
//! └── elonmusk.json
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::MonitorState;

pub use local::LocalStateStore;
pub use memory::MemoryStateStore;

/// Load/save of [`MonitorState`] keyed by username.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// State for `username`, or the default state when nothing was saved yet.
    async fn load(&self, username: &str) -> Result<MonitorState>;

    /// Replace the stored state for `username`.
    async fn save(&self, username: &str, state: &MonitorState) -> Result<()>;
}
