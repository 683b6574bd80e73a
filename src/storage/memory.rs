//! In-process state store for one-shot runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::MonitorState;
use crate::storage::StateStore;

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, MonitorState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one account's state.
    pub fn with_state(username: &str, state: MonitorState) -> Self {
        let mut states = HashMap::new();
        states.insert(username.to_string(), state);
        Self {
            states: RwLock::new(states),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, username: &str) -> Result<MonitorState> {
        Ok(self
            .states
            .read()
            .await
            .get(username)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, username: &str, state: &MonitorState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(username.to_string(), state.clone());
        Ok(())
    }
}
