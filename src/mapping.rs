//! Manual override mapping
//!
//! A hand-maintained JSON object keyed by episode number that supplies what
//! discovery cannot, for episodes that dropped off the catalog or whose detail
//! page no longer renders:
//!
//! ```json
//! {
//!   "87": {
//!     "video_id": "6312345678112",
//!     "image": ["https://sakurazaka46.com/images/14/abc/400_320_102400"],
//!     "detail_url": "https://sakurazaka46.com/s/s46/diary/detail/51234?ima=0000",
//!     "summary": "ゲスト回"
//!   }
//! }
//! ```

use crate::error::{Error, Result};
use crate::types::{Episode, EpisodeNumber, MediaLocator};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One override entry; every field is optional
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MappingEntry {
    /// Known media locator
    #[serde(default)]
    pub video_id: Option<String>,
    /// Candidate cover references; the first one is used
    #[serde(default)]
    pub image: Vec<String>,
    /// Detail page reference
    #[serde(default)]
    pub detail_url: Option<String>,
    /// Text interpolated into the publish description
    #[serde(default)]
    pub summary: Option<String>,
}

/// Parsed mapping file
#[derive(Clone, Debug, Default)]
pub struct OverrideMapping {
    entries: BTreeMap<EpisodeNumber, MappingEntry>,
}

impl OverrideMapping {
    /// Load the mapping; a missing file is an empty mapping
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no override mapping");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&raw).map_err(|e| Error::Config {
            message: format!("invalid override mapping {}: {}", path.display(), e),
            key: Some("storage.mapping_file".to_string()),
        })
    }

    /// Parse mapping JSON
    pub fn parse(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        let entries = serde_json::from_str(raw)?;
        Ok(Self { entries })
    }

    /// Entry for `episode`, if any
    pub fn get(&self, episode: EpisodeNumber) -> Option<&MappingEntry> {
        self.entries.get(&episode)
    }

    /// Build the episode to process in manual mode
    ///
    /// Without an entry the episode carries only its number; the pipeline
    /// then fails it in the resolve stage.
    pub fn episode(&self, episode: EpisodeNumber) -> Episode {
        let mut ep = Episode::new(episode, "");
        if let Some(entry) = self.get(episode) {
            ep.detail_ref = entry.detail_url.clone().unwrap_or_default();
            ep.image_ref = entry.image.first().cloned();
            ep.locator = entry
                .video_id
                .as_ref()
                .filter(|id| !id.trim().is_empty())
                .map(|id| MediaLocator(id.clone()));
            ep.summary = entry.summary.clone();
        }
        ep
    }
}
