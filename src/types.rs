//! Core types for sakumimi-relay

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Episode number assigned by the content source
///
/// Positive and unique; the only identity key across the pipeline. Serializes
/// as a bare integer, and as a string when used as a JSON object key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct EpisodeNumber(u32);

impl EpisodeNumber {
    /// Create an episode number, rejecting zero
    pub fn new(n: u32) -> Option<Self> {
        (n > 0).then_some(Self(n))
    }

    /// Get the inner value
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Deterministic artifact stem, zero-padded to three digits (`EP007`)
    pub fn artifact_stem(&self) -> String {
        format!("EP{:03}", self.0)
    }
}

impl TryFrom<u32> for EpisodeNumber {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        Self::new(n).ok_or_else(|| "episode number must be positive".to_string())
    }
}

impl From<EpisodeNumber> for u32 {
    fn from(ep: EpisodeNumber) -> Self {
        ep.0
    }
}

impl std::fmt::Display for EpisodeNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EpisodeNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid episode number {s:?}: {e}"))?;
        Self::try_from(n)
    }
}

/// Identifier of the episode's media on the hosting player platform
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaLocator(pub String);

impl MediaLocator {
    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned by the publishing platform
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformId(pub String);

impl PlatformId {
    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An episode as discovered in one run
///
/// Ephemeral: rebuilt from the catalog (or the override mapping) every run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Episode {
    /// Episode number
    pub number: EpisodeNumber,
    /// Source-internal identifier of the entry, when discovered from the catalog
    pub entry_id: Option<String>,
    /// Opaque detail reference (URL of the detail page), may be empty
    pub detail_ref: String,
    /// Cover image reference (absolute URL)
    pub image_ref: Option<String>,
    /// Pre-resolved media locator, skipping the resolve stage when present
    pub locator: Option<MediaLocator>,
    /// Free-text summary interpolated into the publish description
    pub summary: Option<String>,
}

impl Episode {
    /// A bare episode with only a number and detail reference
    pub fn new(number: EpisodeNumber, detail_ref: impl Into<String>) -> Self {
        Self {
            number,
            entry_id: None,
            detail_ref: detail_ref.into(),
            image_ref: None,
            locator: None,
            summary: None,
        }
    }
}

/// Pipeline stage an episode can fail in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Resolving the media locator from the detail page
    Resolving,
    /// Downloading audio and cover
    Acquiring,
    /// Merging cover and audio into a video
    Composing,
    /// Uploading the video
    Publishing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::Acquiring => "acquiring",
            Stage::Composing => "composing",
            Stage::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// Per-episode lifecycle within one run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpisodeState {
    /// Present in the batch, nothing done yet
    Discovered,
    /// In a working stage
    InStage(Stage),
    /// Record committed
    Published,
    /// A record with `uploaded=true` already existed; nothing was done
    AlreadyPublished,
    /// Stopped in a stage; no record written, eligible next run
    Failed(Stage),
}

impl EpisodeState {
    /// Enter the next stage; only valid from `Discovered` or a preceding stage
    pub fn enter(self, stage: Stage) -> Self {
        debug_assert!(
            matches!(self, EpisodeState::Discovered | EpisodeState::InStage(_)),
            "cannot enter {stage} from terminal state {self:?}"
        );
        EpisodeState::InStage(stage)
    }

    /// Fail in the current stage
    pub fn fail(self) -> Self {
        match self {
            EpisodeState::InStage(stage) => EpisodeState::Failed(stage),
            other => other,
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EpisodeState::Published | EpisodeState::AlreadyPublished | EpisodeState::Failed(_)
        )
    }
}

/// Final result of driving one episode through the pipeline
#[derive(Debug)]
pub enum EpisodeOutcome {
    /// Published in this run
    Published {
        /// Identifier recorded in the ledger
        platform_id: PlatformId,
        /// Whether the identifier was read from the tool's output or is the placeholder
        id_extracted: bool,
    },
    /// Skipped because a published record already exists
    AlreadyPublished,
    /// Stopped in a stage
    Failed {
        /// The stage that failed
        stage: Stage,
        /// Rendered error message
        reason: String,
    },
}

impl EpisodeOutcome {
    /// Terminal state matching this outcome
    pub fn state(&self) -> EpisodeState {
        match self {
            EpisodeOutcome::Published { .. } => EpisodeState::Published,
            EpisodeOutcome::AlreadyPublished => EpisodeState::AlreadyPublished,
            EpisodeOutcome::Failed { stage, .. } => EpisodeState::Failed(*stage),
        }
    }
}

/// Summary of one check (or manual) cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Episode numbers seen in discovery, in source order
    pub discovered: Vec<EpisodeNumber>,
    /// Episodes driven through the pipeline, in processing order
    pub processed: Vec<(EpisodeNumber, EpisodeOutcome)>,
    /// `last_ep` after the cycle
    pub last_ep: u32,
}

impl CycleReport {
    /// Episodes published during this cycle
    pub fn published(&self) -> impl Iterator<Item = EpisodeNumber> + '_ {
        self.processed.iter().filter_map(|(ep, outcome)| {
            matches!(outcome, EpisodeOutcome::Published { .. }).then_some(*ep)
        })
    }

    /// Episodes that failed during this cycle, with their stage
    pub fn failed(&self) -> impl Iterator<Item = (EpisodeNumber, Stage)> + '_ {
        self.processed.iter().filter_map(|(ep, outcome)| match outcome {
            EpisodeOutcome::Failed { stage, .. } => Some((*ep, *stage)),
            _ => None,
        })
    }
}

/// What a dry run observed
#[derive(Debug, Default)]
pub struct DryRunReport {
    /// Whether authentication succeeded
    pub authenticated: bool,
    /// Newest episodes, source order
    pub episodes: Vec<Episode>,
    /// Locator resolved for the newest episode
    pub newest_locator: Option<MediaLocator>,
}

/// Local artifact locations for one episode
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Resolved audio file
    pub audio: PathBuf,
    /// Cover image, if one could be acquired
    pub cover: Option<PathBuf>,
    /// Composite video target
    pub video: PathBuf,
}
