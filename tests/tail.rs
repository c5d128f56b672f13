//! Tail mode must write exactly what replay writes for the same prefix.

use regime_router::engine::{PostureTable, ReducerConfig};
use regime_router::output::IntentLog;
use regime_router::runtime::{replay_to_bytes, run_tail, Router};
use regime_router::spine::SpineTail;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const HEAD: &[&str] = &[
    r#"{"event_id":"e1","event_type":"listener.start","timestamp":"2026-01-10T00:00:01+00:00","payload":{}}"#,
    r#"{"event_id":"e2","event_type":"market.regime","timestamp":"2026-01-10T00:00:02+00:00","payload":{"symbol":"BTC-USD","regime":"drift"}}"#,
    r#"not json at all"#,
    r#"{"event_id":"e3","event_type":"market.regime","timestamp":"2026-01-10T00:00:03+00:00","payload":{"symbol":"ETH-USD","regime":"high_vol"}}"#,
];

const MORE: &[&str] = &[
    r#"{"event_id":"e4","event_type":"market.regime_change","timestamp":"2026-01-10T00:00:04+00:00","payload":{"symbol":"BTC-USD","from":"drift","to":"breakout"}}"#,
    r#"{"event_id":"e5","event_type":"listener.crash","timestamp":"2026-01-10T00:00:05+00:00","payload":{}}"#,
    r#"{"event_id":"e6","event_type":"invariant.violation","timestamp":"2026-01-10T00:00:06+00:00","payload":{}}"#,
];

fn append(path: &Path, lines: &[&str]) {
    let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}

fn memory_router() -> Router<Vec<u8>> {
    Router::new(
        PostureTable::frozen(),
        ReducerConfig::default(),
        IntentLog::new(Vec::new()),
    )
}

#[tokio::test]
async fn tail_output_matches_replay() {
    let dir = TempDir::new().unwrap();
    let spine = dir.path().join("spine.jsonl");
    append(&spine, HEAD);

    let shutdown = CancellationToken::new();
    let writer_path = spine.clone();
    let cancel = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        append(&writer_path, MORE);
        tokio::time::sleep(Duration::from_millis(400)).await;
        cancel.cancel();
    });

    let mut router = memory_router();
    let stats = run_tail(SpineTail::new(&spine), &mut router, Duration::from_millis(20), &shutdown)
        .await
        .unwrap();
    assert_eq!(stats.malformed, 1);
    let tailed = router.into_log().into_inner();

    let (replayed, summary) = replay_to_bytes(&spine, &ReducerConfig::default()).unwrap();
    assert_eq!(String::from_utf8(tailed).unwrap(), String::from_utf8(replayed).unwrap());
    assert!(summary.router.emitted >= 4);
}

#[tokio::test]
async fn tail_waits_for_spine_to_appear() {
    let dir = TempDir::new().unwrap();
    let spine = dir.path().join("late.jsonl");

    let shutdown = CancellationToken::new();
    let writer_path = spine.clone();
    let cancel = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&writer_path, HEAD);
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let mut router = memory_router();
    run_tail(SpineTail::new(&spine), &mut router, Duration::from_millis(20), &shutdown)
        .await
        .unwrap();
    assert_eq!(router.stats().events, 3);
    assert_eq!(router.state().regime("ETH-USD"), Some("high_vol"));
}

#[tokio::test]
async fn cancelled_tail_stops_without_reading() {
    let dir = TempDir::new().unwrap();
    let spine = dir.path().join("spine.jsonl");
    fs::write(&spine, format!("{}\n", HEAD[0])).unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let mut router = memory_router();
    let stats = run_tail(SpineTail::new(&spine), &mut router, Duration::from_millis(20), &shutdown)
        .await
        .unwrap();
    assert_eq!(stats.lines, 0);
    assert_eq!(router.stats().events, 0);
}
