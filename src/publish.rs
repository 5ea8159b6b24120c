//! Upload to the video platform with biliup

use crate::config::{Config, PublishConfig};
use crate::error::{Error, Result, UploadError};
use crate::tools::{CommandRunner, Invocation, ProcessOutcome, Toolchain};
use crate::types::{EpisodeNumber, PlatformId};
use crate::utils::excerpt;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const STDERR_EXCERPT: usize = 500;

/// Result of a successful upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    /// Platform identifier, or the configured placeholder
    pub platform_id: PlatformId,
    /// Whether the identifier was found in the tool's output
    pub id_extracted: bool,
}

/// Publishes composite videos
pub struct Publisher {
    runner: Arc<dyn CommandRunner>,
    uploader: PathBuf,
    working_dir: PathBuf,
    publish: PublishConfig,
    timeout: Duration,
    id_pattern: Regex,
}

impl Publisher {
    /// Create a publisher
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the identifier pattern fails to compile
    pub fn new(config: &Config, toolchain: &Toolchain, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let id_pattern = Regex::new(&config.publish.id_pattern)
            .map_err(|e| Error::config(format!("invalid id pattern: {e}"), "publish.id_pattern"))?;
        Ok(Self {
            runner,
            uploader: toolchain.uploader.clone(),
            working_dir: config.storage.base_dir.clone(),
            publish: config.publish.clone(),
            timeout: config.tools.upload_timeout,
            id_pattern,
        })
    }

    /// Video title for `episode`
    pub fn title(&self, episode: EpisodeNumber) -> String {
        self.publish.title_template.replace("{ep}", &episode.to_string())
    }

    /// Video description for `episode`
    pub fn description(&self, episode: EpisodeNumber, summary: Option<&str>) -> String {
        self.publish
            .description_template
            .replace("{ep}", &episode.to_string())
            .replace("{summary}", summary.unwrap_or_default())
    }

    /// Uploader invocation for one video
    pub fn invocation(&self, video: &Path, episode: EpisodeNumber, summary: Option<&str>) -> Invocation {
        Invocation::new(&self.uploader)
            .arg("upload")
            .opt("--title", self.title(episode))
            .opt("--desc", self.description(episode, summary))
            .opt("--tag", self.publish.tags.as_str())
            .opt("--tid", self.publish.category.to_string())
            .opt("--copyright", self.publish.copyright.to_string())
            .opt("--source", self.publish.source_url.as_str())
            .arg(video)
            .current_dir(&self.working_dir)
    }

    /// First platform identifier in the tool's output
    pub fn extract_id(&self, output: &str) -> Option<PlatformId> {
        self.id_pattern
            .find(output)
            .map(|m| PlatformId(m.as_str().to_string()))
    }

    /// Upload `video` and report the platform identifier
    ///
    /// Exit status zero is treated as published. When the identifier cannot
    /// be found in the output the configured placeholder is returned with
    /// `id_extracted` unset.
    ///
    /// # Errors
    /// Returns [`UploadError::TimedOut`] or [`UploadError::Failed`]
    pub async fn publish(
        &self,
        video: &Path,
        episode: EpisodeNumber,
        summary: Option<&str>,
    ) -> Result<Publication> {
        let invocation = self.invocation(video, episode, summary);
        info!(episode = episode.get(), title = %self.title(episode), "uploading");

        let outcome = self.runner.run(&invocation, self.timeout).await?;
        if let ProcessOutcome::TimedOut { after } = outcome {
            error!(episode = episode.get(), ?after, "upload timed out");
            return Err(UploadError::TimedOut { episode, after }.into());
        }
        if !outcome.succeeded() {
            let excerpt = excerpt(outcome.stderr(), STDERR_EXCERPT);
            error!(episode = episode.get(), code = ?outcome.code(), stderr = %excerpt, "upload failed");
            return Err(UploadError::Failed {
                episode,
                code: outcome.code(),
                excerpt,
            }
            .into());
        }

        let publication = match self.extract_id(&outcome.combined_output()) {
            Some(platform_id) => Publication {
                platform_id,
                id_extracted: true,
            },
            None => {
                warn!(
                    episode = episode.get(),
                    placeholder = %self.publish.placeholder_id,
                    "upload reported success but no video id was found in its output"
                );
                Publication {
                    platform_id: PlatformId(self.publish.placeholder_id.clone()),
                    id_extracted: false,
                }
            }
        };
        info!(episode = episode.get(), id = %publication.platform_id, "upload complete");
        Ok(publication)
    }
}
