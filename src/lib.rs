//! # sakumimi-relay
//!
//! Relays episodes of a members-only radio programme to a video platform.
//!
//! Each run logs in to the content site, lists the newest episodes, and drives
//! every episode it has not published yet through four stages:
//!
//! 1. Resolve - find the episode's player identifier on its detail page
//! 2. Acquire - download the audio track (yt-dlp) and the cover image
//! 3. Compose - loop the cover over the audio into an MP4 (ffmpeg)
//! 4. Publish - upload the video (biliup) and record it in the ledger
//!
//! Every stage is idempotent through deterministic artifact names and size
//! thresholds, and the JSON ledger guarantees an episode is published at most
//! once across runs, crashes and partial failures.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sakumimi_relay::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default(None)?;
//!     config.validate()?;
//!
//!     let mut orchestrator = Orchestrator::from_config(config).await?;
//!     let report = orchestrator.run_check(5).await?;
//!     println!("published: {:?}", report.published().collect::<Vec<_>>());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Still image + audio composition
pub mod compose;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Manual-mode override mapping
pub mod mapping;
/// Audio and cover acquisition
pub mod media;
/// Episode pipeline and cycle modes
pub mod pipeline;
/// Video platform upload
pub mod publish;
/// Content site access
pub mod source;
/// Progress ledger
pub mod state;
/// External process execution
pub mod tools;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    AuthError, ComposeError, DownloadError, Error, FetchError, ResolveError, Result, StateError,
    UploadError,
};
pub use pipeline::{DRY_RUN_LIMIT, Orchestrator};
pub use source::{AuthenticatedContext, ContentSource, SiteClient};
pub use state::{PipelineState, ProcessingRecord, StateStore};
pub use tools::{CommandRunner, Invocation, ProcessOutcome, SystemRunner};
pub use types::{
    CycleReport, DryRunReport, Episode, EpisodeNumber, EpisodeOutcome, EpisodeState,
    MediaLocator, PlatformId, Stage,
};

/// Resolve when the process is asked to stop (SIGTERM, SIGINT or Ctrl+C)
///
/// Racing a cycle against this drops the cycle's future, and with it any
/// running tool process (they are spawned with `kill_on_drop`). The ledger is
/// only written after an upload succeeds, so an interrupted episode is simply
/// retried next run.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => tokio::select! {
            _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "stop requested"),
            _ = sigint.recv() => tracing::info!(signal = "SIGINT", "stop requested"),
        },
        (Ok(mut available), Err(e)) | (Err(e), Ok(mut available)) => {
            tracing::warn!(error = %e, "could not register one stop signal");
            available.recv().await;
            tracing::info!("stop requested");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Resolve when the process is asked to stop (Ctrl+C)
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
    }
}
