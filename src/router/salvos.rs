//! Salvo definitions.
//!
//! A salvo is a named batch of crosspoints fired together. Definitions live
//! in-process and are last-write-wins by id; execution fans out as ordinary
//! takes at the session layer.

use dashmap::DashMap;

use crate::types::Salvo;

#[derive(Debug, Default)]
pub struct SalvoStore {
    salvos: DashMap<u32, Salvo>,
}

impl SalvoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a salvo definition.
    pub fn upsert(&self, salvo: Salvo) -> Option<Salvo> {
        self.salvos.insert(salvo.id, salvo)
    }

    pub fn get(&self, id: u32) -> Option<Salvo> {
        self.salvos.get(&id).map(|e| e.value().clone())
    }

    pub fn all(&self) -> Vec<Salvo> {
        let mut all: Vec<_> = self.salvos.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.id);
        all
    }

    pub fn len(&self) -> usize {
        self.salvos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.salvos.is_empty()
    }
}
