//! Progress ledger
//!
//! One JSON document records the highest published episode and a record per
//! published episode:
//!
//! ```json
//! {
//!   "last_ep": 200,
//!   "processed": {
//!     "200": { "uploaded": true, "bv": "BV1xx411c7XY", "uploaded_at": "2024-05-14T19:41:07+09:00" }
//!   }
//! }
//! ```
//!
//! The document is loaded once at start and rewritten whole after every
//! publication. Publication is one-way: a record with `uploaded=true` is
//! never replaced, and `last_ep` only moves up.

use crate::error::{Error, Result, StateError};
use crate::types::{EpisodeNumber, PlatformId};
use crate::utils::write_atomic;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};


/// Offset used for `uploaded_at` (UTC+9)
pub fn publication_offset() -> FixedOffset {
    // 9 * 3600 is always within the ±24h range FixedOffset accepts
    FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Current time at the publication offset
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&publication_offset())
}

/// Ledger entry for one episode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingRecord {
    /// Whether the episode has been published
    pub uploaded: bool,

    /// Platform identifier; present iff `uploaded`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bv: Option<PlatformId>,

    /// When the record was committed
    pub uploaded_at: DateTime<FixedOffset>,
}

impl ProcessingRecord {
    /// A committed publication
    pub fn published(platform_id: PlatformId, at: DateTime<FixedOffset>) -> Self {
        Self {
            uploaded: true,
            bv: Some(platform_id),
            uploaded_at: at,
        }
    }
}

/// The persisted document
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineState {
    /// Highest episode number ever fully published
    pub last_ep: u32,

    /// Records keyed by episode number
    pub processed: BTreeMap<EpisodeNumber, ProcessingRecord>,
}

impl PipelineState {
    /// Check the uploaded/identifier invariant on every record, and that a
    /// non-zero `last_ep` points at a published record
    pub fn validate(&self) -> std::result::Result<(), StateError> {
        for (episode, record) in &self.processed {
            match (record.uploaded, &record.bv) {
                (true, None) => {
                    return Err(StateError::InconsistentRecord {
                        episode: *episode,
                        reason: "uploaded without a platform identifier".to_string(),
                    });
                }
                (true, Some(id)) if id.as_str().trim().is_empty() => {
                    return Err(StateError::InconsistentRecord {
                        episode: *episode,
                        reason: "uploaded with an empty platform identifier".to_string(),
                    });
                }
                (false, Some(_)) => {
                    return Err(StateError::InconsistentRecord {
                        episode: *episode,
                        reason: "platform identifier present but not uploaded".to_string(),
                    });
                }
                _ => {}
            }
        }

        let backed = EpisodeNumber::new(self.last_ep).is_some_and(|ep| self.is_published(ep));
        if self.last_ep != 0 && !backed {
            return Err(StateError::UnbackedLastEp {
                last_ep: self.last_ep,
            });
        }
        Ok(())
    }

    /// Whether `episode` has a published record
    pub fn is_published(&self, episode: EpisodeNumber) -> bool {
        self.processed
            .get(&episode)
            .is_some_and(|record| record.uploaded)
    }

    /// Whether a check cycle should pick `episode` up
    pub fn is_eligible(&self, episode: EpisodeNumber) -> bool {
        episode.get() > self.last_ep && !self.is_published(episode)
    }
}

/// File-backed owner of [`PipelineState`]
///
/// Only the pipeline thread writes; every mutation rewrites the whole file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: PipelineState,
}

impl StateStore {
    /// Load the ledger from `path`
    ///
    /// A missing file is an empty ledger. A file that exists but does not
    /// match the documented shape, or breaks a record invariant, is an error;
    /// it is never replaced by an empty default.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(?path, "no state file yet, starting from an empty ledger");
                return Ok(Self {
                    path,
                    state: PipelineState::default(),
                });
            }
            Err(e) => {
                return Err(StateError::Malformed {
                    path,
                    reason: format!("unreadable: {e}"),
                }
                .into());
            }
        };

        let state: PipelineState =
            serde_json::from_str(&raw).map_err(|e| StateError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        state.validate()?;

        debug!(
            ?path,
            last_ep = state.last_ep,
            records = state.processed.len(),
            "loaded state"
        );
        Ok(Self { path, state })
    }

    /// Wrap an in-memory state that will be saved to `path`
    pub fn with_state(path: impl Into<PathBuf>, state: PipelineState) -> Self {
        Self {
            path: path.into(),
            state,
        }
    }

    /// Ledger location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Highest published episode
    pub fn last_ep(&self) -> u32 {
        self.state.last_ep
    }

    /// Whether `episode` has a published record
    pub fn is_published(&self, episode: EpisodeNumber) -> bool {
        self.state.is_published(episode)
    }

    /// Record for `episode`, if any
    pub fn record(&self, episode: EpisodeNumber) -> Option<&ProcessingRecord> {
        self.state.processed.get(&episode)
    }

    /// Commit a publication and persist the ledger
    ///
    /// Refuses to replace an existing published record. `last_ep` advances
    /// only when `episode` is above it. If the save fails the in-memory
    /// commit is kept, so a later save in the same process still records it.
    pub async fn record_publication(
        &mut self,
        episode: EpisodeNumber,
        platform_id: PlatformId,
        at: DateTime<FixedOffset>,
    ) -> Result<()> {
        if let Some(existing) = self.state.processed.get(&episode)
            && existing.uploaded
        {
            return Err(StateError::AlreadyPublished {
                episode,
                platform_id: existing
                    .bv
                    .as_ref()
                    .map(|id| id.0.clone())
                    .unwrap_or_default(),
            }
            .into());
        }

        self.state
            .processed
            .insert(episode, ProcessingRecord::published(platform_id, at));
        if episode.get() > self.state.last_ep {
            self.state.last_ep = episode.get();
        }
        self.save().await
    }

    /// Write the whole document atomically
    pub async fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        write_atomic(&self.path, json.as_bytes())
            .await
            .map_err(|e| match e {
                Error::Io(io) => Error::State(StateError::PersistFailed {
                    path: self.path.clone(),
                    reason: io.to_string(),
                }),
                other => other,
            })?;
        debug!(path = ?self.path, last_ep = self.state.last_ep, "state saved");
        Ok(())
    }
}
