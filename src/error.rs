//! Error types for sakumimi-relay
//!
//! Errors fall into two groups:
//! - cycle-fatal errors (configuration, authentication, catalog fetch, state
//!   persistence) that abort a whole check cycle before or while it runs
//! - per-episode errors (resolve, download, compose, upload) that fail a
//!   single episode and leave it eligible for the next run

use crate::types::{EpisodeNumber, Stage};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for sakumimi-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sakumimi-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "tools.encode_timeout")
        key: Option<String>,
    },

    /// Authentication handshake with the content site failed
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Catalog listing could not be fetched or was not the authenticated variant
    #[error("catalog fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Media locator could not be resolved from a detail page
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Audio or cover acquisition failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Still-image + audio composition failed
    #[error("compose error: {0}")]
    Compose(#[from] ComposeError),

    /// Publishing the composite video failed
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Progress ledger could not be loaded, validated or saved
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool could not be launched (yt-dlp, ffmpeg, biliup)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error aborts the whole check cycle
    ///
    /// Authentication and catalog failures mean there is nothing trustworthy
    /// to iterate over; state failures mean progress can no longer be
    /// recorded, so continuing could publish an episode twice.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::Auth(_) | Error::Fetch(_) | Error::State(_)
        )
    }

    /// The per-episode stage this error belongs to, if it is stage-scoped
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Resolve(_) => Some(Stage::Resolving),
            Error::Download(_) => Some(Stage::Acquiring),
            Error::Compose(_) => Some(Stage::Composing),
            Error::Upload(_) => Some(Stage::Publishing),
            _ => None,
        }
    }
}

/// Authentication handshake errors
///
/// Non-retryable within a run: the cycle is aborted and nothing is fetched.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The landing page could not be fetched
    #[error("failed to load landing page {url}: {reason}")]
    LandingPage {
        /// The landing page URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// The anti-forgery token was not present in the landing page
    #[error("anti-forgery token not found on {url}")]
    TokenNotFound {
        /// The landing page URL that was searched
        url: String,
    },

    /// The login form submission failed at the transport level
    #[error("login submission to {url} failed: {reason}")]
    LoginRequest {
        /// The login URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// Login completed but the session cookie was never issued
    #[error("session cookie {cookie} missing after login")]
    SessionCookieMissing {
        /// Name of the expected cookie
        cookie: String,
    },

    /// Credentials were not configured
    #[error("no credentials configured")]
    MissingCredentials,
}

/// Catalog listing errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure while fetching the listing
    #[error("failed to fetch listing {url}: {reason}")]
    Request {
        /// The listing URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// The listing returned a non-success status
    #[error("listing {url} returned HTTP {status}")]
    Status {
        /// The listing URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The listing rendered but is too short to be the authenticated variant
    #[error("listing too short ({len} bytes, need at least {min}); session is probably not logged in")]
    TooShort {
        /// Response body length
        len: usize,
        /// Minimum accepted length
        min: usize,
    },
}

/// Episode detail resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No detail reference was available to resolve from
    #[error("episode {episode} has no detail reference and no known media locator")]
    MissingDetailReference {
        /// The episode that could not be resolved
        episode: EpisodeNumber,
    },

    /// Transport failure while fetching the detail page
    #[error("failed to fetch detail page {url}: {reason}")]
    Request {
        /// The detail page URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// Neither the primary nor the fallback pattern matched
    #[error("no media locator found on {url}")]
    LocatorNotFound {
        /// The detail page URL that was searched
        url: String,
    },
}

/// Media acquisition errors (audio track and cover image)
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The downloader ran past its wall-clock limit
    #[error("audio download for episode {episode} timed out after {after:?}")]
    TimedOut {
        /// The episode being downloaded
        episode: EpisodeNumber,
        /// The timeout that elapsed
        after: Duration,
    },

    /// The downloader exited without leaving a qualifying audio file
    #[error("no audio file above {min_bytes} bytes for episode {episode}: {excerpt}")]
    NoOutput {
        /// The episode being downloaded
        episode: EpisodeNumber,
        /// Minimum accepted size
        min_bytes: u64,
        /// Excerpt of the downloader's error output
        excerpt: String,
    },

    /// Cover fetch failed at the transport level or with a bad status
    #[error("cover fetch {url} failed: {reason}")]
    Cover {
        /// The (upgraded) cover URL
        url: String,
        /// Underlying failure
        reason: String,
    },
}

/// Composition errors
#[derive(Debug, Error)]
pub enum ComposeError {
    /// No cover image was available and no valid video already exists
    #[error("no cover image available for {output}")]
    MissingCover {
        /// The video that could not be produced
        output: PathBuf,
    },

    /// The encoder ran past its wall-clock limit
    #[error("encoder timed out after {after:?} producing {output}")]
    TimedOut {
        /// The video being produced
        output: PathBuf,
        /// The timeout that elapsed
        after: Duration,
    },

    /// The encoder exited non-zero or produced an undersized file
    #[error("encoder failed for {output} (exit {code:?}): {excerpt}")]
    Failed {
        /// The video being produced
        output: PathBuf,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Excerpt of the encoder's error output
        excerpt: String,
    },
}

/// Publishing errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// The publishing tool ran past its wall-clock limit
    #[error("upload of episode {episode} timed out after {after:?}")]
    TimedOut {
        /// The episode being published
        episode: EpisodeNumber,
        /// The timeout that elapsed
        after: Duration,
    },

    /// The publishing tool exited non-zero
    #[error("upload of episode {episode} failed (exit {code:?}): {excerpt}")]
    Failed {
        /// The episode being published
        episode: EpisodeNumber,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Excerpt of the tool's error output
        excerpt: String,
    },
}

/// Progress ledger errors
#[derive(Debug, Error)]
pub enum StateError {
    /// The state file exists but could not be parsed into the expected shape
    #[error("state file {path} is malformed: {reason}")]
    Malformed {
        /// The state file path
        path: PathBuf,
        /// Parser or validation message
        reason: String,
    },

    /// A record violates the uploaded/identifier invariant
    #[error("record for episode {episode} is inconsistent: {reason}")]
    InconsistentRecord {
        /// The episode whose record is invalid
        episode: EpisodeNumber,
        /// What is wrong with it
        reason: String,
    },

    /// `last_ep` names an episode with no published record
    #[error("last_ep {last_ep} has no published record")]
    UnbackedLastEp {
        /// The recorded `last_ep`
        last_ep: u32,
    },

    /// Attempt to overwrite a published record
    #[error("episode {episode} is already published as {platform_id}")]
    AlreadyPublished {
        /// The episode that is already published
        episode: EpisodeNumber,
        /// The identifier recorded for it
        platform_id: String,
    },

    /// Writing the state file failed
    #[error("failed to persist state to {path}: {reason}")]
    PersistFailed {
        /// The state file path
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },
}
