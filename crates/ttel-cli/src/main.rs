//! `ttel` command-line front end: record a demonstration trace, replay a
//! log to a target event time, or inspect a log's summary statistics.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use ttel_config::TtelConfig;
use ttel_host::{JsrtCallGuard, ScriptHost};
use ttel_log::EventLog;
use ttel_record::ArgValue;
use ttel_snapshot::SnapshotExtractor;

#[derive(Parser, Debug)]
#[command(name = "ttel", version, about = "Time-travel event log tool")]
struct Args {
    /// Optional path to a `ttel.toml` configuration file.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a short demonstration trace to `path`.
    Record {
        path: PathBuf,
        /// Number of synthetic date_now events to record.
        #[arg(long, default_value_t = 4)]
        steps: u32,
    },
    /// Replay a log up to (and including) `to`, or to the end if omitted.
    Replay {
        path: PathBuf,
        #[arg(long)]
        to: Option<i64>,
    },
    /// Print summary statistics for a log without replaying it.
    Inspect { path: PathBuf },
}

/// Script host used when the CLI drives replay itself; real embedders
/// supply their own `ScriptHost` wired to an actual engine.
struct DemoHost;

impl ScriptHost for DemoHost {
    fn execute_host_action(&mut self, action: &ttel_record::HostAction) {
        info!(target: "ttel.cli", ?action, "replayed host action");
    }
}

/// Stand-in for the real engine's heap walk; a real embedder's extractor
/// serializes live object state instead of an empty payload.
struct DemoSnapshotExtractor;

impl SnapshotExtractor for DemoSnapshotExtractor {
    fn extract(&mut self) -> (Vec<u8>, u64, u64) {
        (Vec::new(), 0, 0)
    }
}

fn configure_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let log_path = log_dir.join("ttel.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }
    let file_appender = tracing_appender::rolling::never(log_dir, "ttel.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "ttel.cli.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = TtelConfig::load_from(args.config.as_deref())?;
    std::fs::create_dir_all(&config.log_dir).ok();
    let _log_guard = configure_logging(&config.log_dir);
    install_panic_hook();

    info!(target: "ttel.cli", command = ?args.command, "startup");

    match args.command {
        Command::Record { path, steps } => record(&config, &path, steps),
        Command::Replay { path, to } => replay(&config, &path, to),
        Command::Inspect { path } => inspect(&config, &path),
    }
}

fn record(config: &TtelConfig, path: &Path, steps: u32) -> Result<()> {
    let mut log = EventLog::new(config.clone());
    log.init_for_record([]);
    let mut extractor = DemoSnapshotExtractor;
    for i in 0..steps {
        log.record_date_time(f64::from(i))
            .context("recording date_now event")?;

        // Brackets the host->script round trip this step represents, which
        // is what feeds elapsed execution time into the snapshot policy.
        let guard = JsrtCallGuard::begin(&mut log, 0);
        guard.normal_return(ArgValue::Undefined, false);

        if log.snapshot_threshold_crossed() {
            log.extract_snapshot(&mut extractor)
                .context("extracting snapshot")?;
        }
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    log.emit(&mut writer).context("emitting log")?;
    info!(target: "ttel.cli", path = %path.display(), steps, "recorded trace");
    Ok(())
}

fn replay(config: &TtelConfig, path: &Path, to: Option<i64>) -> Result<()> {
    let mut log = EventLog::new(config.clone());
    let mut reader = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    log.init_for_replay(&mut reader).context("parsing log")?;

    let mut host = DemoHost;
    let outcome = match to {
        Some(target) => log.replay_to_time(target, &mut host),
        None => log.replay_full_trace(&mut host),
    };
    match outcome {
        Ok(()) => {
            info!(target: "ttel.cli", "replay complete");
            Ok(())
        }
        Err(ttel_log::ReplayFailure::Abort(abort)) => {
            info!(target: "ttel.cli", ?abort, "replay stopped");
            Ok(())
        }
        Err(ttel_log::ReplayFailure::Fatal(e)) => {
            error!(target: "ttel.cli", error = %e, "replay failed");
            Err(e.into())
        }
    }
}

fn inspect(config: &TtelConfig, path: &Path) -> Result<()> {
    let mut log = EventLog::new(config.clone());
    let mut reader = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    log.init_for_replay(&mut reader).context("parsing log")?;

    println!("events: {}", log.event_count());
    let snapshot_times = log.snapshot_times();
    println!("snapshots: {}", snapshot_times.len());
    for t in snapshot_times {
        println!("  snapshot @ event_time {t}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_reports_event_count_and_snapshot_times() {
        let config = TtelConfig::default();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        record(&config, tmp.path(), 3).context("recording demo trace").unwrap();

        inspect(&config, tmp.path()).context("inspecting demo trace").unwrap();

        let mut log = EventLog::new(config.clone());
        let mut reader = File::open(tmp.path()).unwrap();
        log.init_for_replay(&mut reader).unwrap();
        assert_eq!(log.event_count(), 9); // 3 steps * (begin, date_now, end)
        assert!(log.snapshot_times().is_empty());
    }
}
