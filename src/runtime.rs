//! Orchestration: replay and tail modes over one shared per-event path.
//!
//! Both modes feed events through [`Router::step`], so they cannot diverge:
//! the only difference is where events come from and when the loop ends.

use anyhow::{Context, Result};
use serde_json::json;
use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::RouterConfig;
use crate::engine::{
    apply, evaluate, Evaluation, GlobalState, Intent, PostureTable, ReducerConfig,
};
use crate::logging::{
    self, log, log_emission, log_session_summary, log_suppressed, log_veto, obj, v_str, Domain,
    Level,
};
use crate::output::{Deduplicator, IntentLog};
use crate::spine::{EventKind, ReaderStats, SpineEvent, SpineReader, SpineTail};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub events: u64,
    pub ignored: u64,
    pub evaluations: u64,
    pub vetoes: u64,
    pub emitted: u64,
    pub suppressed: u64,
    /// Posture-relevant events lacking `event_id` or `timestamp`.
    pub unattributed: u64,
}

impl RouterStats {
    fn counters(&self) -> [(&'static str, u64); 7] {
        [
            ("events", self.events),
            ("ignored", self.ignored),
            ("evaluations", self.evaluations),
            ("vetoes", self.vetoes),
            ("emitted", self.emitted),
            ("suppressed", self.suppressed),
            ("unattributed", self.unattributed),
        ]
    }
}

/// Owns the state projection, the frozen table, the dedup cache and the
/// output sink for one run.
pub struct Router<W> {
    state: GlobalState,
    table: PostureTable,
    cfg: ReducerConfig,
    dedup: Deduplicator,
    log: IntentLog<W>,
    stats: RouterStats,
}

impl<W: Write> Router<W> {
    pub fn new(table: PostureTable, cfg: ReducerConfig, log: IntentLog<W>) -> Self {
        Self {
            state: GlobalState::new(),
            table,
            cfg,
            dedup: Deduplicator::new(),
            log,
            stats: RouterStats::default(),
        }
    }

    /// Fold one event and emit whatever it changed. Returns the number of
    /// records written. An error here is fatal for the run.
    pub fn step(&mut self, event: &SpineEvent) -> Result<usize> {
        self.stats.events += 1;
        if event.kind() == EventKind::Other {
            self.stats.ignored += 1;
            log(
                Level::Trace,
                Domain::State,
                "ignored_event",
                obj(&[("event_type", v_str(&event.event_type))]),
            );
        }

        let out = apply(&mut self.state, event, &self.cfg);
        if out.affected.is_empty() {
            return Ok(0);
        }

        let Some((event_id, ts)) = event.provenance() else {
            self.stats.unattributed += 1;
            log(
                Level::Warn,
                Domain::Emit,
                "unattributed_event",
                obj(&[
                    ("event_type", v_str(&event.event_type)),
                    ("offset", json!(event.offset)),
                    ("msg", v_str("event_id or timestamp missing; state folded, emission skipped")),
                ]),
            );
            return Ok(0);
        };

        let mut written = 0;
        for symbol in &out.affected {
            self.stats.evaluations += 1;
            let outcome = evaluate(&self.state, symbol, &self.table);
            if let Evaluation::Veto(reason) = &outcome {
                self.stats.vetoes += 1;
                log_veto(symbol, reason.as_str(), &event.event_type);
            }
            let posture = outcome.into_posture(&self.state, symbol);

            if !self.dedup.should_emit(symbol, &posture) {
                self.stats.suppressed += 1;
                log_suppressed(symbol, event_id);
                continue;
            }

            let intent = Intent {
                symbol: symbol.clone(),
                posture,
                source_event_id: event_id.to_string(),
                source_ts: ts.to_string(),
            };
            self.log.append(&intent)?;
            log_emission(
                symbol,
                event_id,
                intent.posture.direction.as_str(),
                intent.posture.size_pct,
                intent.posture.risk_cap.as_str(),
            );
            self.dedup.record(symbol, intent.posture);
            self.stats.emitted += 1;
            written += 1;
        }
        Ok(written)
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn into_log(self) -> IntentLog<W> {
        self.log
    }
}

// =============================================================================
// Replay
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub reader: ReaderStats,
    pub router: RouterStats,
    pub state_hash: String,
}

/// Replay a finite spine into `output`. A missing input fails before the
/// output file is touched.
pub fn run_replay(input: &Path, output: &Path, cfg: &ReducerConfig) -> Result<ReplaySummary> {
    let reader = SpineReader::replay(input)?;
    let table = PostureTable::frozen();
    log_startup("replay", &table, input, output);

    let sink = IntentLog::open(output)?;
    let (_, summary) = replay_events(reader, Router::new(table, cfg.clone(), sink))?;
    log_summary("replay", &summary.reader, &summary.router, &summary.state_hash);
    Ok(summary)
}

/// Replay a spine file into an in-memory buffer and return the bytes.
pub fn replay_to_bytes(input: &Path, cfg: &ReducerConfig) -> Result<(Vec<u8>, ReplaySummary)> {
    let reader = SpineReader::replay(input)?;
    let router = Router::new(PostureTable::frozen(), cfg.clone(), IntentLog::new(Vec::new()));
    let (log, summary) = replay_events(reader, router)?;
    Ok((log.into_inner(), summary))
}

pub fn replay_events<R, W>(
    mut reader: SpineReader<R>,
    mut router: Router<W>,
) -> Result<(IntentLog<W>, ReplaySummary)>
where
    R: BufRead,
    W: Write,
{
    for event in reader.by_ref() {
        router.step(&event)?;
    }
    if let Some(err) = reader.take_error() {
        return Err(err).context("spine read failed during replay");
    }
    let summary = ReplaySummary {
        reader: reader.stats(),
        router: router.stats(),
        state_hash: router.state().hash(),
    };
    Ok((router.into_log(), summary))
}

// =============================================================================
// Tail
// =============================================================================

/// Tail until `shutdown` fires. Cancellation is honoured between events and
/// during the poll wait, never in the middle of applying an event.
pub async fn run_tail<W: Write>(
    mut tail: SpineTail,
    router: &mut Router<W>,
    poll: Duration,
    shutdown: &CancellationToken,
) -> Result<ReaderStats> {
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let batch = match tail.poll() {
            Ok(batch) => batch,
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Spine,
                    "read_error",
                    obj(&[
                        ("offset", json!(tail.offset())),
                        ("error", v_str(&err.to_string())),
                    ]),
                );
                Vec::new()
            }
        };

        for event in &batch {
            router.step(event)?;
            // Let the shutdown watchers run on a current-thread runtime.
            tokio::task::yield_now().await;
            if shutdown.is_cancelled() {
                return Ok(tail.stats());
            }
        }

        if tail.has_backlog() {
            continue;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(poll) => {}
        }
    }
    Ok(tail.stats())
}

/// Daemon mode: tail the configured spine into the configured output.
pub async fn run_daemon(cfg: &RouterConfig, shutdown: &CancellationToken) -> Result<RouterStats> {
    let table = PostureTable::frozen();
    log_startup("daemon", &table, &cfg.spine_path, &cfg.output_path);

    let sink = IntentLog::open(&cfg.output_path)?;
    let mut router = Router::new(table, cfg.reducer_config(), sink);
    let tail = if cfg.from_end {
        SpineTail::from_end(&cfg.spine_path)
    } else {
        SpineTail::new(&cfg.spine_path)
    };

    let reader_stats = run_tail(tail, &mut router, cfg.poll_interval(), shutdown).await?;
    log_summary("daemon", &reader_stats, &router.stats(), &router.state().hash());
    Ok(router.stats())
}

/// Cancel `shutdown` on Ctrl-C or when `kill_file` appears.
pub fn spawn_shutdown_watch(shutdown: &CancellationToken, kill_file: PathBuf, poll: Duration) {
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log(
                Level::Info,
                Domain::System,
                "shutdown",
                obj(&[("msg", v_str("Ctrl+C received; stopping after current event"))]),
            );
            on_ctrl_c.cancel();
        }
    });

    let on_kill_file = shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = on_kill_file.cancelled() => return,
                _ = tokio::time::sleep(poll) => {}
            }
            if kill_file.exists() {
                log(
                    Level::Info,
                    Domain::System,
                    "shutdown",
                    obj(&[("kill_file", v_str(&kill_file.to_string_lossy()))]),
                );
                on_kill_file.cancel();
                return;
            }
        }
    });
}

fn log_startup(mode: &str, table: &PostureTable, input: &Path, output: &Path) {
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("mode", v_str(mode)),
            ("input", v_str(&input.to_string_lossy())),
            ("output", v_str(&output.to_string_lossy())),
            ("table_version", v_str(table.version())),
            ("table_sha256", v_str(&table.fingerprint())),
        ]),
    );
}

fn log_summary(mode: &str, reader: &ReaderStats, router: &RouterStats, state_hash: &str) {
    let mut counters = vec![
        ("lines", reader.lines),
        ("malformed", reader.malformed),
        ("rotations", reader.rotations),
    ];
    counters.extend(router.counters());
    log_session_summary(mode, &counters, state_hash);
}

/// SHA-256 of a file's bytes, used to compare replay outputs.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut file, &mut bytes)?;
    Ok(logging::sha256_hex(&bytes))
}
