//! Crosspoint tally cache.
//!
//! The single source of truth for observed router state in this process.
//! Keyed by (matrix, level, destination): at most one source is recorded per
//! key, and a new tally overwrites prior state. The cache is volatile;
//! reconnect reconciliation rebuilds it from tally dumps.

use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::protocol::TallyEntry;
use crate::types::{CrosspointAddress, CrosspointKey, CrosspointState, CrosspointStatus};

#[derive(Debug, Default)]
pub struct CrosspointCache {
    entries: DashMap<CrosspointKey, CrosspointState>,
    last_update: RwLock<Option<SystemTime>>,
}

impl CrosspointCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a router tally. The router's word is final: this replaces any
    /// optimistic `pending` entry for the key.
    pub fn apply_tally(&self, entry: TallyEntry) -> CrosspointState {
        self.write(CrosspointState::new(
            entry.address,
            CrosspointStatus::Connected,
            entry.source_status,
        ))
    }

    /// Record an optimistic `pending` entry for a take that has been issued
    /// but not yet tallied.
    pub fn apply_pending(&self, address: CrosspointAddress) -> CrosspointState {
        self.write(CrosspointState::new(
            address,
            CrosspointStatus::Pending,
            false,
        ))
    }

    fn write(&self, state: CrosspointState) -> CrosspointState {
        self.entries.insert(state.address.key(), state);
        *self.last_update.write() = Some(state.last_update);
        state
    }

    pub fn get(&self, key: &CrosspointKey) -> Option<CrosspointState> {
        self.entries.get(key).map(|e| *e.value())
    }

    pub fn all(&self) -> Vec<CrosspointState> {
        let mut states: Vec<_> = self.entries.iter().map(|e| *e.value()).collect();
        states.sort_by_key(|s| (s.address.matrix, s.address.level, s.address.destination));
        states
    }

    pub fn by_level(&self, matrix: u8, level: u8) -> Vec<CrosspointState> {
        let mut states: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.key().matrix == matrix && e.key().level == level)
            .map(|e| *e.value())
            .collect();
        states.sort_by_key(|s| s.address.destination);
        states
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_update(&self) -> Option<SystemTime> {
        *self.last_update.read()
    }
}
