//! Source and destination labels.
//!
//! In-process only; persistence is an external collaborator's job. Writes
//! are last-write-wins with no locking beyond the map shard.

use dashmap::DashMap;

use crate::types::LabelKey;

#[derive(Debug, Default)]
pub struct LabelStore {
    labels: DashMap<LabelKey, String>,
}

impl LabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a label, returning the previous value if any.
    pub fn set(&self, key: LabelKey, label: String) -> Option<String> {
        self.labels.insert(key, label)
    }

    pub fn get(&self, key: &LabelKey) -> Option<String> {
        self.labels.get(key).map(|e| e.value().clone())
    }

    pub fn all(&self) -> Vec<(LabelKey, String)> {
        let mut all: Vec<_> = self
            .labels
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        all.sort_by_key(|(k, _)| (k.target as u8, k.matrix, k.level, k.index));
        all
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LabelTarget;

    fn key(index: u16) -> LabelKey {
        LabelKey {
            target: LabelTarget::Source,
            matrix: 0,
            level: 0,
            index,
        }
    }

    #[test]
    fn last_write_wins() {
        let store = LabelStore::new();
        assert_eq!(store.set(key(1), "CAM 1".into()), None);
        assert_eq!(store.set(key(1), "CAM 1B".into()), Some("CAM 1".into()));
        assert_eq!(store.get(&key(1)), Some("CAM 1B".into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn source_and_destination_keys_are_distinct() {
        let store = LabelStore::new();
        let src = key(1);
        let dst = LabelKey {
            target: LabelTarget::Destination,
            ..src
        };
        store.set(src, "CAM 1".into());
        store.set(dst, "MON 1".into());
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&dst), Some("MON 1".into()));
    }
}
