//! Content site access: login, catalog listing and detail resolution
//!
//! The pipeline only talks to the site through [`ContentSource`], so tests can
//! swap in a scripted source. [`SiteClient`] is the real implementation.

use crate::config::SourceConfig;
use crate::error::Result;
use crate::types::{Episode, MediaLocator};
use async_trait::async_trait;

mod catalog;
mod resolver;
mod session;

pub use catalog::CatalogFetcher;
pub use resolver::EpisodeResolver;
pub use session::{AuthenticatedContext, SessionManager};

/// Where episodes come from
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Log in and return a context usable for the rest of the run
    ///
    /// # Errors
    /// Returns [`crate::error::AuthError`] on any handshake failure
    async fn authenticate(&self) -> Result<AuthenticatedContext>;

    /// The newest `limit` episodes, newest first
    ///
    /// # Errors
    /// Returns [`crate::error::FetchError`] when the listing is unavailable or
    /// not the logged-in variant
    async fn list_recent_episodes(
        &self,
        context: &AuthenticatedContext,
        limit: usize,
    ) -> Result<Vec<Episode>>;

    /// Resolve the media locator from a detail page
    ///
    /// # Errors
    /// Returns [`crate::error::ResolveError`] when the page cannot be fetched
    /// or carries no locator
    async fn resolve_media_locator(
        &self,
        context: Option<&AuthenticatedContext>,
        detail_ref: &str,
    ) -> Result<MediaLocator>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// The live content site
pub struct SiteClient {
    session: SessionManager,
    catalog: CatalogFetcher,
    resolver: EpisodeResolver,
}

impl SiteClient {
    /// Build the site client from configuration
    ///
    /// # Errors
    /// Returns error if an HTTP client or extraction pattern cannot be built
    pub fn new(config: SourceConfig) -> Result<Self> {
        Ok(Self {
            resolver: EpisodeResolver::new(&config)?,
            catalog: CatalogFetcher::new(config.clone())?,
            session: SessionManager::new(config)?,
        })
    }
}

#[async_trait]
impl ContentSource for SiteClient {
    async fn authenticate(&self) -> Result<AuthenticatedContext> {
        self.session.authenticate().await
    }

    async fn list_recent_episodes(
        &self,
        context: &AuthenticatedContext,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        self.catalog.fetch_recent(context, limit).await
    }

    async fn resolve_media_locator(
        &self,
        context: Option<&AuthenticatedContext>,
        detail_ref: &str,
    ) -> Result<MediaLocator> {
        self.resolver.resolve(context, detail_ref).await
    }

    fn name(&self) -> &'static str {
        "site"
    }
}
