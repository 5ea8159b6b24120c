//! Radio listing: fetch and extract episodes

use super::session::AuthenticatedContext;
use crate::config::SourceConfig;
use crate::error::{Error, FetchError, Result};
use crate::types::{Episode, EpisodeNumber};
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use tracing::{debug, info};

/// Class that marks a radio entry (the page reuses `data-player-id` elsewhere)
const ITEM_CLASS: &str = "sakumimi-list-item";

/// Fetches the listing page and turns it into episodes
///
/// Extraction is anchor-based: each `data-player-id="N"` attribute is
/// located, the enclosing `<li>…</li>` fragment is cut out around it, and the
/// episode number and cover are read from that fragment.
pub struct CatalogFetcher {
    config: SourceConfig,
    anchor: Regex,
    episode: Regex,
    image: Regex,
}

impl CatalogFetcher {
    /// Create a fetcher for the configured site
    ///
    /// # Errors
    /// Returns error if the extraction patterns fail to compile
    pub fn new(config: SourceConfig) -> Result<Self> {
        let compile = |pattern: &str, case_insensitive: bool| {
            RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| Error::Other(format!("invalid listing pattern: {}", e)))
        };
        Ok(Self {
            anchor: compile(r#"data-player-id="(\d+)""#, false)?,
            episode: compile(r"<span>#(\d{3,4})</span>", false)?,
            image: compile(r#"<img[^>]+src="(/images/[^"]+)""#, true)?,
            config,
        })
    }

    /// Fetch up to `limit` of the newest episodes, in source order (newest first)
    ///
    /// # Errors
    /// Returns [`FetchError`] on transport failure, a non-success status, or a
    /// body shorter than `min_listing_bytes` (the login-wall variant of the
    /// page renders short even with HTTP 200).
    pub async fn fetch_recent(
        &self,
        context: &AuthenticatedContext,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        let url = self.config.url(&self.config.listing_path);
        debug!(%url, limit, "fetching listing");

        let response = context
            .client()
            .get(&url)
            .timeout(self.config.listing_timeout)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.text().await.map_err(|e| FetchError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        if body.len() < self.config.min_listing_bytes {
            return Err(FetchError::TooShort {
                len: body.len(),
                min: self.config.min_listing_bytes,
            }
            .into());
        }

        let episodes = self.parse_listing(&body, limit);
        info!(
            count = episodes.len(),
            newest = ?episodes.first().map(|e| e.number.get()),
            "listing fetched"
        );
        Ok(episodes)
    }

    /// Extract episodes from listing markup, preserving source order
    ///
    /// Fragments that are not radio entries, or that carry no recognizable
    /// episode number, are dropped. A repeated episode number keeps its first
    /// occurrence.
    pub fn parse_listing(&self, body: &str, limit: usize) -> Vec<Episode> {
        let mut episodes = Vec::new();
        let mut seen = HashSet::new();

        for caps in self.anchor.captures_iter(body) {
            if episodes.len() >= limit {
                break;
            }
            let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Some(block) = enclosing_item(body, whole.start(), whole.end()) else {
                continue;
            };
            if !block.contains(ITEM_CLASS) {
                continue;
            }

            let number = self
                .episode
                .captures(block)
                .and_then(|c| c[1].parse::<u32>().ok())
                .and_then(EpisodeNumber::new);
            let Some(number) = number else {
                debug!(entry_id = id.as_str(), "entry without episode number, skipping");
                continue;
            };
            if !seen.insert(number) {
                continue;
            }

            let image_ref = self.image.captures(block).map(|c| self.config.url(&c[1]));
            episodes.push(Episode {
                number,
                entry_id: Some(id.as_str().to_string()),
                detail_ref: self.config.detail_url(id.as_str()),
                image_ref,
                locator: None,
                summary: None,
            });
        }
        episodes
    }
}

/// The `<li …>…</li>` fragment around the byte range `start..end`
fn enclosing_item(body: &str, start: usize, end: usize) -> Option<&str> {
    let li_start = body[..start].rfind("<li")?;
    let li_end = end + body[end..].find("</li>")? + "</li>".len();
    Some(&body[li_start..li_end])
}
