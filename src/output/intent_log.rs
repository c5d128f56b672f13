//! Append-only intent log.
//!
//! One `router.intent` JSON object per line, flushed after every write.
//! Records are validated at this boundary; any failure, validation or I/O, is
//! returned to the caller as fatal because a skipped line breaks the audit
//! trail.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::engine::{Direction, Intent, Posture};

pub const INTENT_EVENT_TYPE: &str = "router.intent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentPayload {
    pub symbol: String,
    #[serde(flatten)]
    pub posture: Posture,
}

/// Wire shape of one output line. Field order is part of the byte format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub event_type: String,
    pub payload: IntentPayload,
    pub source_event_id: String,
    pub source_ts: String,
}

impl IntentRecord {
    pub fn from_intent(intent: &Intent) -> Self {
        Self {
            event_type: INTENT_EVENT_TYPE.to_string(),
            payload: IntentPayload {
                symbol: intent.symbol.clone(),
                posture: intent.posture.clone(),
            },
            source_event_id: intent.source_event_id.clone(),
            source_ts: intent.source_ts.clone(),
        }
    }
}

/// Surface checks applied before a record may be written.
pub fn validate(intent: &Intent) -> Result<()> {
    let p = &intent.posture;
    if intent.symbol.is_empty() {
        bail!("symbol is empty");
    }
    if !p.size_pct.is_finite() || !(0.0..=1.0).contains(&p.size_pct) {
        bail!("size_pct {} outside [0, 1]", p.size_pct);
    }
    if p.rationale.is_empty() {
        bail!("rationale is empty");
    }
    if (p.direction == Direction::Flat) != (p.size_pct == 0.0) {
        bail!(
            "direction {} inconsistent with size_pct {}",
            p.direction.as_str(),
            p.size_pct
        );
    }
    Ok(())
}

/// Render one output line (without the trailing newline).
pub fn render(intent: &Intent) -> Result<String> {
    validate(intent).with_context(|| {
        format!(
            "refusing to emit invalid intent for {} (source {})",
            intent.symbol, intent.source_event_id
        )
    })?;
    serde_json::to_string(&IntentRecord::from_intent(intent)).map_err(|e| anyhow!(e))
}

#[derive(Debug)]
pub struct IntentLog<W> {
    sink: W,
    written: u64,
}

impl IntentLog<File> {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open intent log {}", path.display()))?;
        Ok(Self::new(file))
    }

    /// Read every record back, failing on the first unreadable line.
    pub fn read_records(path: &Path) -> Result<Vec<IntentRecord>> {
        let file = File::open(path)
            .with_context(|| format!("cannot open intent log {}", path.display()))?;
        let mut out = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .with_context(|| format!("line {} of {}", n + 1, path.display()))?;
            out.push(record);
        }
        Ok(out)
    }
}

impl<W: Write> IntentLog<W> {
    pub fn new(sink: W) -> Self {
        Self { sink, written: 0 }
    }

    pub fn append(&mut self, intent: &Intent) -> Result<()> {
        let mut line = render(intent)?;
        line.push('\n');
        self.sink
            .write_all(line.as_bytes())
            .and_then(|_| self.sink.flush())
            .context("intent log write failed")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
