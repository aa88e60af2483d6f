//! In-memory ledger store for testing.

use std::sync::Mutex;

use crate::ledger::{LedgerError, LedgerStore, RunState};

/// Ledger store that keeps the document in memory.
///
/// Useful when a test cares about engine behavior rather than persistence.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<Option<RunState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a run state.
    pub fn with_state(state: RunState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// The last saved state, if any.
    pub fn saved_state(&self) -> Option<RunState> {
        self.state.lock().unwrap().clone()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Option<RunState>, LedgerError> {
        Ok(self.state.lock().unwrap().clone())
    }

    fn save(&self, state: &RunState) -> Result<(), LedgerError> {
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_loads_none() {
        let store = MemoryLedgerStore::new();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryLedgerStore::new();
        let state = RunState::empty();
        store.save(&state).unwrap();
        assert!(store.load().unwrap().is_some());
    }
}
