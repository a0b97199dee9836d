//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use sessionloom_core::error::StorageError;
use sessionloom_core::memory::{PersistedState, StateStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// A `StateStore` that keeps the state in process memory.
pub struct InMemoryStore {
    state: Arc<RwLock<PersistedState>>,
    saves: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_state(PersistedState::default())
    }

    /// Start from an existing state (e.g. a seeded profile in tests).
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Copy of the currently stored state.
    pub async fn snapshot(&self) -> PersistedState {
        self.state.read().await.clone()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self) -> Result<PersistedState, StorageError> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        *self.state.write().await = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
