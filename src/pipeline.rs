//! Episode pipeline: discovery, then resolve → acquire → compose → publish
//!
//! Episodes are driven one at a time, in ascending episode-number order.
//! A stage failure stops that episode only; it writes nothing to the ledger
//! and the episode is picked up again on the next run. Only authentication,
//! catalog and ledger failures abort a cycle.

use crate::compose::Compositor;
use crate::config::Config;
use crate::error::{ResolveError, Result};
use crate::mapping::OverrideMapping;
use crate::media::MediaAcquirer;
use crate::publish::{Publication, Publisher};
use crate::source::{AuthenticatedContext, ContentSource, SiteClient};
use crate::state::{self, PipelineState, StateStore};
use crate::tools::{CommandRunner, SystemRunner, Toolchain};
use crate::types::{
    ArtifactPaths, CycleReport, DryRunReport, Episode, EpisodeNumber, EpisodeOutcome,
    EpisodeState, Stage,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How many episodes a dry run lists
pub const DRY_RUN_LIMIT: usize = 3;

/// Drives episodes through the pipeline and owns the ledger
pub struct Orchestrator {
    config: Arc<Config>,
    source: Arc<dyn ContentSource>,
    media: MediaAcquirer,
    compositor: Compositor,
    publisher: Publisher,
    store: StateStore,
}

impl Orchestrator {
    /// Build an orchestrator around an explicit source and process runner
    ///
    /// Loads the ledger; a malformed ledger fails here.
    pub async fn new(
        config: Config,
        source: Arc<dyn ContentSource>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let toolchain = Toolchain::from_config(&config.tools);
        debug!(?toolchain, runner = runner.name(), source = source.name(), "pipeline tools");

        let store = StateStore::load(config.storage.state_path()).await?;
        Ok(Self {
            media: MediaAcquirer::new(&config, &toolchain, Arc::clone(&runner))?,
            compositor: Compositor::new(&config, &toolchain, Arc::clone(&runner)),
            publisher: Publisher::new(&config, &toolchain, runner)?,
            config: Arc::new(config),
            source,
            store,
        })
    }

    /// Build an orchestrator for the live site and real tools
    pub async fn from_config(config: Config) -> Result<Self> {
        let source = Arc::new(SiteClient::new(config.source.clone())?);
        Self::new(config, source, Arc::new(SystemRunner)).await
    }

    /// Current ledger contents
    pub fn state(&self) -> &PipelineState {
        self.store.state()
    }

    /// One check cycle over the newest `limit` episodes
    ///
    /// Eligible episodes (above `last_ep` and not yet published) are processed
    /// in ascending order regardless of listing order.
    ///
    /// # Errors
    /// Returns the authentication, catalog or ledger error that aborted the
    /// cycle. Per-episode failures are reported in the [`CycleReport`].
    pub async fn run_check(&mut self, limit: usize) -> Result<CycleReport> {
        info!(
            now = %state::now().format("%Y-%m-%d %H:%M %:z"),
            last_ep = self.store.last_ep(),
            limit,
            "starting check cycle"
        );

        let context = self.source.authenticate().await?;
        let episodes = self.source.list_recent_episodes(&context, limit).await?;

        let mut report = CycleReport {
            discovered: episodes.iter().map(|e| e.number).collect(),
            last_ep: self.store.last_ep(),
            ..Default::default()
        };

        let mut eligible: Vec<&Episode> = episodes
            .iter()
            .filter(|e| self.store.state().is_eligible(e.number))
            .collect();
        eligible.sort_by_key(|e| e.number);
        eligible.dedup_by_key(|e| e.number);

        if eligible.is_empty() {
            info!(
                newest = ?episodes.first().map(|e| e.number.get()),
                last_ep = self.store.last_ep(),
                "no new episodes"
            );
            return Ok(report);
        }

        let numbers: Vec<u32> = eligible.iter().map(|e| e.number.get()).collect();
        info!(count = eligible.len(), episodes = ?numbers, "new episodes found");

        for episode in eligible {
            let outcome = self.process_episode(Some(&context), episode).await?;
            report.processed.push((episode.number, outcome));
        }

        report.last_ep = self.store.last_ep();
        log_cycle(&report);
        Ok(report)
    }

    /// Process one episode by number, outside discovery
    ///
    /// Inputs come from the override mapping. When the locator must be
    /// resolved from a detail page, a login is attempted first and a login
    /// failure falls back to an anonymous fetch. An already-published episode
    /// is left alone.
    ///
    /// # Errors
    /// Returns a mapping or ledger error
    pub async fn run_manual(&mut self, number: EpisodeNumber) -> Result<CycleReport> {
        info!(episode = number.get(), "manual run");
        let mapping = OverrideMapping::load(&self.config.storage.mapping_path()).await?;
        let episode = mapping.episode(number);

        let context = if !self.store.is_published(number)
            && episode.locator.is_none()
            && !episode.detail_ref.trim().is_empty()
        {
            match self.source.authenticate().await {
                Ok(context) => Some(context),
                Err(e) => {
                    warn!(episode = number.get(), error = %e, "login failed, resolving anonymously");
                    None
                }
            }
        } else {
            None
        };

        let outcome = self.process_episode(context.as_ref(), &episode).await?;
        let report = CycleReport {
            discovered: vec![number],
            processed: vec![(number, outcome)],
            last_ep: self.store.last_ep(),
        };
        log_cycle(&report);
        Ok(report)
    }

    /// Exercise login, listing and resolution without side effects
    ///
    /// # Errors
    /// Returns the authentication or catalog error
    pub async fn dry_run(&self, limit: usize) -> Result<DryRunReport> {
        let context = self.source.authenticate().await?;
        info!(session = context.session_preview(), "login ok");

        let episodes = self.source.list_recent_episodes(&context, limit).await?;
        for episode in &episodes {
            info!(
                episode = episode.number.get(),
                detail = %episode.detail_ref,
                image = episode.image_ref.as_deref().unwrap_or("-"),
                "listed"
            );
        }

        let newest_locator = match episodes.first() {
            Some(newest) => match self
                .source
                .resolve_media_locator(Some(&context), &newest.detail_ref)
                .await
            {
                Ok(locator) => {
                    info!(episode = newest.number.get(), %locator, "resolved newest episode");
                    Some(locator)
                }
                Err(e) => {
                    warn!(episode = newest.number.get(), error = %e, "could not resolve newest episode");
                    None
                }
            },
            None => {
                warn!("listing is empty");
                None
            }
        };

        Ok(DryRunReport {
            authenticated: true,
            episodes,
            newest_locator,
        })
    }

    /// Drive one episode to a terminal state
    ///
    /// Stage errors become [`EpisodeOutcome::Failed`]. The only error returned
    /// is a ledger failure after a successful upload, which must stop the cycle.
    pub async fn process_episode(
        &mut self,
        context: Option<&AuthenticatedContext>,
        episode: &Episode,
    ) -> Result<EpisodeOutcome> {
        let number = episode.number;
        if self.store.is_published(number) {
            info!(episode = number.get(), "already published, skipping");
            return Ok(EpisodeOutcome::AlreadyPublished);
        }

        info!(episode = number.get(), "processing episode");
        let mut progress = EpisodeState::Discovered;
        let publication = match self.run_stages(context, episode, &mut progress).await {
            Ok(publication) => publication,
            Err(e) => {
                let stage = match progress.fail() {
                    EpisodeState::Failed(stage) => stage,
                    _ => e.stage().unwrap_or(Stage::Resolving),
                };
                error!(episode = number.get(), %stage, error = %e, "episode failed");
                return Ok(EpisodeOutcome::Failed {
                    stage,
                    reason: e.to_string(),
                });
            }
        };

        self.store
            .record_publication(number, publication.platform_id.clone(), state::now())
            .await?;
        info!(episode = number.get(), id = %publication.platform_id, "episode published");
        Ok(EpisodeOutcome::Published {
            platform_id: publication.platform_id,
            id_extracted: publication.id_extracted,
        })
    }

    async fn run_stages(
        &self,
        context: Option<&AuthenticatedContext>,
        episode: &Episode,
        progress: &mut EpisodeState,
    ) -> Result<Publication> {
        let number = episode.number;

        *progress = progress.enter(Stage::Resolving);
        let locator = match &episode.locator {
            Some(locator) => locator.clone(),
            None if episode.detail_ref.trim().is_empty() => {
                return Err(ResolveError::MissingDetailReference { episode: number }.into());
            }
            None => {
                self.source
                    .resolve_media_locator(context, &episode.detail_ref)
                    .await?
            }
        };

        *progress = progress.enter(Stage::Acquiring);
        let audio = self.media.acquire_audio(&locator, number).await?;
        let cover = match self
            .media
            .acquire_cover(episode.image_ref.as_deref(), number)
            .await
        {
            Ok(cover) => cover,
            Err(e) => {
                warn!(episode = number.get(), error = %e, "cover unavailable");
                None
            }
        };
        let artifacts = ArtifactPaths {
            audio,
            cover,
            video: self
                .config
                .storage
                .video_path()
                .join(format!("{}.mp4", number.artifact_stem())),
        };
        debug!(episode = number.get(), ?artifacts, "artifacts");

        *progress = progress.enter(Stage::Composing);
        self.compositor
            .compose(artifacts.cover.as_deref(), &artifacts.audio, &artifacts.video)
            .await?;

        *progress = progress.enter(Stage::Publishing);
        self.publisher
            .publish(&artifacts.video, number, episode.summary.as_deref())
            .await
    }
}

fn log_cycle(report: &CycleReport) {
    let published: Vec<u32> = report.published().map(|e| e.get()).collect();
    let failed: Vec<String> = report
        .failed()
        .map(|(ep, stage)| format!("{}@{}", ep, stage))
        .collect();
    info!(
        ?published,
        ?failed,
        last_ep = report.last_ep,
        "cycle finished"
    );
}
