//! Posture vocabulary and the frozen regime table.
//!
//! The table is configuration, not inference. It is built once per process,
//! owned by the router and never mutated; changing a row is a reviewed code
//! change that must also update the pinned-value tests below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::logging::sha256_hex;

pub const TABLE_VERSION: &str = "v0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::Flat => "flat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCap {
    Low,
    Normal,
    High,
}

impl RiskCap {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCap::Low => "low",
            RiskCap::Normal => "normal",
            RiskCap::High => "high",
        }
    }
}

/// Declarative posture. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posture {
    pub direction: Direction,
    pub size_pct: f64,
    pub risk_cap: RiskCap,
    pub rationale: Vec<String>,
}

impl Posture {
    /// Zero-exposure posture used for every veto.
    pub fn flat(rationale: Vec<String>) -> Self {
        Self {
            direction: Direction::Flat,
            size_pct: 0.0,
            risk_cap: RiskCap::Low,
            rationale,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.direction == Direction::Flat
    }
}

/// A posture bound to the symbol and the spine event that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub symbol: String,
    pub posture: Posture,
    pub source_event_id: String,
    pub source_ts: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct TableRow {
    direction: Direction,
    size_pct: f64,
    risk_cap: RiskCap,
}

/// Versioned `regime -> posture` lookup. Regimes absent from the table have
/// no posture and resolve to a veto upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct PostureTable {
    version: &'static str,
    rows: BTreeMap<&'static str, TableRow>,
}

impl PostureTable {
    pub fn frozen() -> Self {
        let mut rows = BTreeMap::new();
        rows.insert(
            "drift",
            TableRow {
                direction: Direction::Long,
                size_pct: 0.25,
                risk_cap: RiskCap::Normal,
            },
        );
        rows.insert(
            "breakout",
            TableRow {
                direction: Direction::Long,
                size_pct: 0.25,
                risk_cap: RiskCap::High,
            },
        );
        // No row for high_vol or chop: both veto.
        Self {
            version: TABLE_VERSION,
            rows,
        }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn regimes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rows.keys().copied()
    }

    pub fn lookup(&self, regime: &str) -> Option<Posture> {
        self.rows.get(regime).map(|row| Posture {
            direction: row.direction,
            size_pct: row.size_pct,
            risk_cap: row.risk_cap,
            rationale: vec![format!("regime={}", regime)],
        })
    }

    /// SHA-256 over the canonical JSON of the table, logged at startup so a
    /// run can be tied to the exact table it used.
    pub fn fingerprint(&self) -> String {
        let body = serde_json::json!({
            "version": self.version,
            "rows": self.rows,
        });
        sha256_hex(body.to_string().as_bytes())
    }
}
