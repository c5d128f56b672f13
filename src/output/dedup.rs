//! Per-symbol emission cache.
//!
//! Comparison is structural over the posture only. Source id and timestamp
//! differ on every event and are never part of the key.

use std::collections::BTreeMap;

use crate::engine::Posture;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deduplicator {
    last: BTreeMap<String, Posture>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `candidate` would change what was last emitted for `symbol`.
    pub fn should_emit(&self, symbol: &str, candidate: &Posture) -> bool {
        self.last.get(symbol) != Some(candidate)
    }

    /// Record an emission. Call right after the record is written, before
    /// the next event is folded.
    pub fn record(&mut self, symbol: &str, posture: Posture) {
        self.last.insert(symbol.to_string(), posture);
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
