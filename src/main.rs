//! Router entry point.
//!
//! - no arguments: tail the configured spine until Ctrl-C or the kill file
//! - `--replay INPUT OUTPUT`: one-shot deterministic replay

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use regime_router::config::{Mode, RouterConfig, USAGE};
use regime_router::logging::{log, obj, v_str, Domain, Level};
use regime_router::runtime;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        log(
            Level::Fatal,
            Domain::System,
            "fatal",
            obj(&[("error", v_str(&format!("{:#}", err)))]),
        );
        eprintln!("regime-router: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut cfg = RouterConfig::from_env()?;
    match cfg.apply_args(std::env::args().skip(1))? {
        Mode::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        Mode::Replay { input, output } => {
            runtime::run_replay(&input, &output, &cfg.reducer_config())?;
            Ok(())
        }
        Mode::Daemon => {
            let shutdown = CancellationToken::new();
            runtime::spawn_shutdown_watch(&shutdown, cfg.kill_file.clone(), cfg.poll_interval());
            runtime::run_daemon(&cfg, &shutdown).await?;
            Ok(())
        }
    }
}
