//! Determinism check: replay a spine twice and compare the output bytes.
//!
//! Usage: replay_check [--violation-epoch RFC3339] <spine.jsonl> [expected_output.jsonl]
//!
//! With a second path, the replay is also compared against an existing
//! output file (for example one written by a tailing daemon). The violation
//! epoch is read from `ROUTER_VIOLATION_EPOCH` or the flag, as for the router
//! itself, so the comparison folds the spine the same way the daemon did.
//!
//! Exit codes: 0 identical, 1 usage or read failure, 2 runs differ,
//! 3 differs from the expected file.

use anyhow::{Context, Result};
use serde_json::json;
use std::env;

use regime_router::config::RouterConfig;
use regime_router::logging::sha256_hex;
use regime_router::runtime::{file_sha256, replay_to_bytes};

const USAGE: &str =
    "usage: replay_check [--violation-epoch RFC3339] <spine.jsonl> [expected_output.jsonl]";

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("replay_check: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let mut cfg = RouterConfig::from_env()?;
    let paths = cfg.apply_check_args(env::args().skip(1))?;
    let (input, expected) = match paths.as_slice() {
        [input] => (input, None),
        [input, expected] => (input, Some(expected)),
        _ => {
            eprintln!("{}", USAGE);
            return Ok(1);
        }
    };
    let reducer_cfg = cfg.reducer_config();

    let (first, summary) = replay_to_bytes(input, &reducer_cfg).context("replay failed")?;
    let (second, _) = replay_to_bytes(input, &reducer_cfg).context("second replay failed")?;

    let first_hash = sha256_hex(&first);
    let second_hash = sha256_hex(&second);
    let expected_hash = match expected {
        Some(path) => Some(file_sha256(path).context("cannot hash expected output")?),
        None => None,
    };

    let report = json!({
        "input": input.to_string_lossy(),
        "violation_epoch": cfg.violation_epoch.map(|e| e.to_rfc3339()),
        "records": summary.router.emitted,
        "malformed_lines": summary.reader.malformed,
        "state_hash": summary.state_hash,
        "run_a_sha256": first_hash,
        "run_b_sha256": second_hash,
        "expected_sha256": expected_hash,
        "deterministic": first == second,
    });
    println!("{}", report);

    if first != second {
        return Ok(2);
    }
    if expected_hash.is_some_and(|h| h != first_hash) {
        return Ok(3);
    }
    Ok(0)
}
