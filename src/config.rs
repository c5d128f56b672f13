//! Runtime configuration: environment first, command-line flags on top.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, FixedOffset};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::ReducerConfig;

/// Poll interval floor; tighter loops only burn CPU on an idle spine.
pub const MIN_POLL_MS: u64 = 100;
pub const DEFAULT_POLL_MS: u64 = 1000;

pub const USAGE: &str = "\
usage: regime-router [--spine PATH] [--output PATH] [--poll-ms N] [--from-end]
                     [--violation-epoch RFC3339]
       regime-router --replay INPUT OUTPUT [--violation-epoch RFC3339]

Without --replay the router tails the spine until Ctrl-C or the kill file appears.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Daemon,
    Replay { input: PathBuf, output: PathBuf },
    Help,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub spine_path: PathBuf,
    pub output_path: PathBuf,
    pub poll_ms: u64,
    /// Start tailing at the current end of the spine instead of offset 0.
    pub from_end: bool,
    /// Violations stamped before this instant are ignored.
    pub violation_epoch: Option<DateTime<FixedOffset>>,
    pub kill_file: PathBuf,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            spine_path: PathBuf::from("./event_spine.jsonl"),
            output_path: PathBuf::from("./router_intent.jsonl"),
            poll_ms: DEFAULT_POLL_MS,
            from_end: false,
            violation_epoch: None,
            kill_file: PathBuf::from("/tmp/ROUTER_STOP"),
        }
    }
}

impl RouterConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let violation_epoch = match std::env::var("ROUTER_VIOLATION_EPOCH") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_epoch(&raw)?),
            _ => None,
        };
        Ok(Self {
            spine_path: std::env::var("ROUTER_SPINE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.spine_path),
            output_path: std::env::var("ROUTER_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),
            poll_ms: std::env::var("ROUTER_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.poll_ms),
            from_end: std::env::var("ROUTER_FROM_END")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            violation_epoch,
            kill_file: std::env::var("ROUTER_KILL_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.kill_file),
        })
    }

    /// Apply command-line flags (without the program name) and pick the mode.
    pub fn apply_args<I>(&mut self, args: I) -> Result<Mode>
    where
        I: IntoIterator<Item = String>,
    {
        let mut mode = Mode::Daemon;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--replay" => {
                    let input = next_value(&mut args, "--replay")?;
                    let output = next_value(&mut args, "--replay")?;
                    mode = Mode::Replay {
                        input: PathBuf::from(input),
                        output: PathBuf::from(output),
                    };
                }
                "--spine" => self.spine_path = PathBuf::from(next_value(&mut args, "--spine")?),
                "--output" => self.output_path = PathBuf::from(next_value(&mut args, "--output")?),
                "--poll-ms" => {
                    let raw = next_value(&mut args, "--poll-ms")?;
                    self.poll_ms = raw
                        .parse()
                        .map_err(|_| anyhow!("--poll-ms expects an integer, got {:?}", raw))?;
                }
                "--from-end" => self.from_end = true,
                "--violation-epoch" => {
                    let raw = next_value(&mut args, "--violation-epoch")?;
                    self.violation_epoch = Some(parse_epoch(&raw)?);
                }
                "-h" | "--help" => return Ok(Mode::Help),
                other => bail!("unexpected argument {:?}\n{}", other, USAGE),
            }
        }
        Ok(mode)
    }

    /// Arguments for `replay_check`: `--violation-epoch` is applied like in
    /// [`RouterConfig::apply_args`], everything else is returned as a path.
    pub fn apply_check_args<I>(&mut self, args: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut paths = Vec::new();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--violation-epoch" => {
                    let raw = next_value(&mut args, "--violation-epoch")?;
                    self.violation_epoch = Some(parse_epoch(&raw)?);
                }
                other if other.starts_with("--") => bail!("unexpected argument {:?}", other),
                _ => paths.push(PathBuf::from(arg)),
            }
        }
        Ok(paths)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(MIN_POLL_MS))
    }

    /// Reducer settings shared by every mode, so daemon output, `--replay`
    /// and `replay_check` fold the same spine identically.
    pub fn reducer_config(&self) -> ReducerConfig {
        ReducerConfig {
            violation_epoch: self.violation_epoch,
        }
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{} expects a value\n{}", flag, USAGE))
}

fn parse_epoch(raw: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|e| anyhow!("invalid violation epoch {:?}: {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_selects_daemon() {
        let mut cfg = RouterConfig::default();
        assert_eq!(cfg.apply_args(Vec::new()).unwrap(), Mode::Daemon);
    }

    #[test]
    fn replay_takes_two_paths() {
        let mut cfg = RouterConfig::default();
        let mode = cfg.apply_args(args(&["--replay", "in.jsonl", "out.jsonl"])).unwrap();
        assert_eq!(
            mode,
            Mode::Replay {
                input: PathBuf::from("in.jsonl"),
                output: PathBuf::from("out.jsonl"),
            }
        );
        assert!(cfg.apply_args(args(&["--replay", "in.jsonl"])).is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let mut cfg = RouterConfig::default();
        cfg.apply_args(args(&[
            "--spine",
            "/var/spine.jsonl",
            "--poll-ms",
            "250",
            "--from-end",
            "--violation-epoch",
            "2026-01-10T00:00:00+00:00",
        ]))
        .unwrap();
        assert_eq!(cfg.spine_path, PathBuf::from("/var/spine.jsonl"));
        assert_eq!(cfg.poll_ms, 250);
        assert!(cfg.from_end);
        assert!(cfg.violation_epoch.is_some());
    }

    #[test]
    fn epoch_flag_reaches_reducer_config() {
        let mut cfg = RouterConfig::default();
        assert_eq!(cfg.reducer_config(), ReducerConfig::default());
        cfg.apply_args(args(&["--violation-epoch", "2026-01-10T00:00:00+00:00"]))
            .unwrap();
        assert_eq!(
            cfg.reducer_config().violation_epoch,
            Some(DateTime::parse_from_rfc3339("2026-01-10T00:00:00+00:00").unwrap())
        );
    }

    #[test]
    fn check_args_split_epoch_from_paths() {
        let mut cfg = RouterConfig::default();
        let paths = cfg
            .apply_check_args(args(&[
                "spine.jsonl",
                "--violation-epoch",
                "2026-01-10T00:00:00+00:00",
                "daemon_out.jsonl",
            ]))
            .unwrap();
        assert_eq!(
            paths,
            vec![PathBuf::from("spine.jsonl"), PathBuf::from("daemon_out.jsonl")]
        );
        assert!(cfg.reducer_config().violation_epoch.is_some());
        assert!(cfg.apply_check_args(args(&["--from-end"])).is_err());
    }

    #[test]
    fn poll_interval_has_floor() {
        let cfg = RouterConfig {
            poll_ms: 5,
            ..RouterConfig::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_millis(MIN_POLL_MS));
    }

    #[test]
    fn rejects_unknown_flag_and_bad_epoch() {
        let mut cfg = RouterConfig::default();
        assert!(cfg.apply_args(args(&["--turbo"])).is_err());
        assert!(cfg.apply_args(args(&["--violation-epoch", "yesterday"])).is_err());
        assert!(cfg.apply_args(args(&["--poll-ms", "fast"])).is_err());
    }
}
