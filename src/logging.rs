//! Structured logging for the router runtime.
//!
//! Every record is one JSON object on stderr:
//! `{ts, run_id, seq, lvl, component, event, msg, [symbol], data}`.
//! Stdout is never written by the library, and nothing here feeds back into
//! emitted intent bytes, so logging settings cannot break replay determinism.
//!
//! Filtering:
//! - `LOG_LEVEL` = trace | debug | info | warn | error | fatal (default info)
//! - `LOG_DOMAINS` = comma-separated domain list, or `all` (default)

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            _ => None,
        }
    }

    pub fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| Level::parse(&v))
            .unwrap_or(Level::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Spine,      // Line reads, malformed input, rotation
    State,      // Reducer transitions
    Constraint, // Veto decisions
    Emit,       // Output records and suppressions
    System,     // Startup, shutdown, configuration
    Audit,      // Replay digests and run summaries
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Spine => "spine",
            Domain::State => "state",
            Domain::Constraint => "constraint",
            Domain::Emit => "emit",
            Domain::System => "system",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_ID: OnceLock<String> = OnceLock::new();
static MIN_LEVEL: OnceLock<Level> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

pub fn run_id() -> &'static str {
    RUN_ID.get_or_init(|| {
        std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()))
    })
}

fn min_level() -> Level {
    *MIN_LEVEL.get_or_init(Level::from_env)
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["symbol", "event_id", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < min_level() || !domain.is_enabled() {
        return;
    }
    let line = render_record(level, domain.as_str(), event, fields);
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = writeln!(handle, "{}", line);
}

fn render_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) -> String {
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    Value::Object(entry).to_string()
}

// =============================================================================
// Domain helpers
// =============================================================================

pub fn log_malformed_line(offset: u64, reason: &str) {
    log(
        Level::Warn,
        Domain::Spine,
        "malformed_line",
        obj(&[("offset", json!(offset)), ("reason", v_str(reason))]),
    );
}

pub fn log_rotation(path: &str, previous_offset: u64) {
    log(
        Level::Warn,
        Domain::Spine,
        "rotation",
        obj(&[
            ("path", v_str(path)),
            ("previous_offset", json!(previous_offset)),
            ("msg", v_str("spine replaced or truncated; restarting at offset 0")),
        ]),
    );
}

pub fn log_veto(symbol: &str, reason: &str, event_type: &str) {
    log(
        Level::Debug,
        Domain::Constraint,
        "veto",
        obj(&[
            ("symbol", v_str(symbol)),
            ("reason", v_str(reason)),
            ("trigger", v_str(event_type)),
        ]),
    );
}

pub fn log_emission(symbol: &str, event_id: &str, direction: &str, size_pct: f64, risk_cap: &str) {
    log(
        Level::Info,
        Domain::Emit,
        "intent",
        obj(&[
            ("symbol", v_str(symbol)),
            ("event_id", v_str(event_id)),
            ("direction", v_str(direction)),
            ("size_pct", v_num(size_pct)),
            ("risk_cap", v_str(risk_cap)),
        ]),
    );
}

pub fn log_suppressed(symbol: &str, event_id: &str) {
    log(
        Level::Trace,
        Domain::Emit,
        "suppressed",
        obj(&[("symbol", v_str(symbol)), ("event_id", v_str(event_id))]),
    );
}

/// Log the end-of-run audit record
pub fn log_session_summary(mode: &str, counters: &[(&str, u64)], state_hash: &str) {
    let mut fields = Map::new();
    fields.insert("mode".to_string(), v_str(mode));
    for (name, value) in counters {
        fields.insert((*name).to_string(), json!(value));
    }
    fields.insert("state_hash".to_string(), v_str(state_hash));
    log(Level::Info, Domain::Audit, "session_summary", fields);
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Hex-encoded SHA-256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering_matches_severity() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Warn < Level::Error);
        assert_eq!(Level::parse("warn"), Some(Level::Warn));
        assert_eq!(Level::parse("loud"), None);
    }

    #[test]
    fn record_lifts_symbol_and_msg() {
        let line = render_record(
            Level::Info,
            "emit",
            "intent",
            obj(&[
                ("symbol", v_str("BTC-USD")),
                ("msg", v_str("hello")),
                ("size_pct", v_num(0.25)),
            ]),
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["symbol"], "BTC-USD");
        assert_eq!(parsed["msg"], "hello");
        assert_eq!(parsed["lvl"], "INFO");
        assert_eq!(parsed["data"]["size_pct"], 0.25);
        assert!(parsed["data"].get("symbol").is_none());
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
