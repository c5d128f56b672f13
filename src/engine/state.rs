//! Router state: a disposable projection of the spine.
//!
//! Nothing here is persisted. Every field is derived from the ordered event
//! prefix, so rebuilding from an empty state reproduces it exactly, and the
//! hash below is the equality witness used by replay checks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::logging::sha256_hex;

/// System-level veto gate. `Blocked` is terminal for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    Unblocked,
    Blocked,
}

impl Gate {
    /// Transition on an observed (epoch-admitted) violation.
    pub fn on_violation(self) -> Gate {
        Gate::Blocked
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Gate::Blocked)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    /// Most recent lifecycle event wins.
    pub listener_alive: bool,
    /// Any lifecycle event observed at all.
    pub listener_seen: bool,
    /// Sticky: never cleared once set.
    pub violation_active: bool,
    pub last_listener_event_ts: Option<String>,
    pub last_violation_ts: Option<String>,
}

impl SystemState {
    pub fn gate(&self) -> Gate {
        if self.violation_active {
            Gate::Blocked
        } else {
            Gate::Unblocked
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolState {
    pub regime: Option<String>,
    pub last_regime_ts: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    pub system: SystemState,
    /// Ordered so system-wide fan-out visits symbols deterministically.
    pub symbols: BTreeMap<String, SymbolState>,
    /// Events folded so far, including ignored types.
    pub applied: u64,
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Created lazily, never removed.
    pub fn symbol_mut(&mut self, symbol: &str) -> &mut SymbolState {
        self.symbols.entry(symbol.to_string()).or_default()
    }

    pub fn symbol(&self, symbol: &str) -> Option<&SymbolState> {
        self.symbols.get(symbol)
    }

    pub fn regime(&self, symbol: &str) -> Option<&str> {
        self.symbols.get(symbol).and_then(|s| s.regime.as_deref())
    }

    pub fn known_symbols(&self) -> Vec<String> {
        self.symbols.keys().cloned().collect()
    }

    /// Hex SHA-256 of the canonical JSON encoding.
    pub fn hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        sha256_hex(&bytes)
    }
}
