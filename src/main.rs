//! Command-line entry point
//!
//! Exit status is 0 when the cycle ran to completion, even if individual
//! episodes failed, and 1 when it was aborted (configuration, ledger,
//! login or listing failure).

use clap::{ArgGroup, Parser};
use sakumimi_relay::{
    Config, DRY_RUN_LIMIT, EpisodeNumber, EpisodeOutcome, Error, Orchestrator, Result,
    shutdown_signal,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "sakumimi-relay",
    version,
    about = "Relay new radio episodes to the video platform, once each"
)]
#[command(group(ArgGroup::new("mode").args(["check", "ep", "test"])))]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Check the newest episodes and process new ones (the default mode)
    #[arg(long)]
    check: bool,

    /// Process one episode by number, using the override mapping if present
    #[arg(long, value_name = "N")]
    ep: Option<EpisodeNumber>,

    /// Log in, list and resolve without downloading or uploading
    #[arg(long)]
    test: bool,

    /// How many of the newest episodes to inspect
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Credentials may live in .env; the real environment still wins
    dotenvy::dotenv().ok();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_tracing(config.storage.log_path().as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = run(&cli, config) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "run aborted");
                ExitCode::FAILURE
            }
        },
        _ = shutdown_signal() => {
            warn!("interrupted, episode in progress will be retried next run");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load_or_default(path)?;
    config.validate()?;
    Ok(config)
}

/// Console output plus, when configured, a plain-text log file
///
/// `RUST_LOG` overrides the default `info` level. The returned guard flushes
/// the file writer on drop.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::Other(format!("invalid log filter: {e}")))?;

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| Error::config("log file has no file name", "storage.log_file"))?;
            std::fs::create_dir_all(dir)?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to initialise logging: {e}")))?;

    Ok(guard)
}

async fn run(cli: &Cli, config: Config) -> Result<()> {
    if cli.test {
        config.require_credentials()?;
        let orchestrator = Orchestrator::from_config(config).await?;
        info!("dry run: no downloads, no uploads, no ledger changes");
        let report = orchestrator
            .dry_run(cli.limit.unwrap_or(DRY_RUN_LIMIT))
            .await?;
        let numbers: Vec<u32> = report.episodes.iter().map(|e| e.number.get()).collect();
        info!(
            episodes = ?numbers,
            newest_locator = report.newest_locator.as_ref().map(|l| l.as_str()).unwrap_or("-"),
            "dry run finished"
        );
        return Ok(());
    }

    if let Some(number) = cli.ep {
        let mut orchestrator = Orchestrator::from_config(config).await?;
        let report = orchestrator.run_manual(number).await?;
        if let Some((_, EpisodeOutcome::Failed { stage, reason })) = report.processed.first() {
            warn!(episode = number.get(), %stage, %reason, "manual run did not publish");
        }
        return Ok(());
    }

    config.require_credentials()?;
    let limit = cli.limit.unwrap_or(config.check_limit);
    let mut orchestrator = Orchestrator::from_config(config).await?;
    orchestrator.run_check(limit).await?;
    Ok(())
}
