//! Detail page → media locator

use super::session::AuthenticatedContext;
use crate::config::SourceConfig;
use crate::error::{Error, ResolveError, Result};
use crate::types::MediaLocator;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

/// Resolves an episode's streaming-player identifier from its detail page
pub struct EpisodeResolver {
    anonymous: reqwest::Client,
    primary: Regex,
    fallback: Regex,
}

impl EpisodeResolver {
    /// Create a resolver
    ///
    /// The anonymous client is used when no authenticated context is given.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or a pattern fails to compile
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let anonymous = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        let primary = RegexBuilder::new(r#"data-video-?id="(\d{10,})""#)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Other(format!("invalid locator pattern: {}", e)))?;
        let fallback = Regex::new(r#"videoId["\s:=]+["']?(\d{10,})"#)
            .map_err(|e| Error::Other(format!("invalid locator pattern: {}", e)))?;

        Ok(Self {
            anonymous,
            primary,
            fallback,
        })
    }

    /// Find the locator in detail page markup
    ///
    /// The element attribute form is tried first; the embedded-script form is
    /// the fallback.
    pub fn extract_locator(&self, body: &str) -> Option<MediaLocator> {
        self.primary
            .captures(body)
            .or_else(|| self.fallback.captures(body))
            .map(|caps| MediaLocator(caps[1].to_string()))
    }

    /// Fetch `detail_ref` and extract its locator
    ///
    /// # Errors
    /// Returns [`ResolveError::Request`] on transport failure or bad status,
    /// and [`ResolveError::LocatorNotFound`] when neither pattern matches.
    pub async fn resolve(
        &self,
        context: Option<&AuthenticatedContext>,
        detail_ref: &str,
    ) -> Result<MediaLocator> {
        if detail_ref.trim().is_empty() {
            return Err(ResolveError::Request {
                url: String::new(),
                reason: "empty detail reference".to_string(),
            }
            .into());
        }

        let client = context.map_or(&self.anonymous, |ctx| ctx.client());
        debug!(url = detail_ref, authenticated = context.is_some(), "fetching detail page");

        let request_error = |e: reqwest::Error| ResolveError::Request {
            url: detail_ref.to_string(),
            reason: e.to_string(),
        };
        let body = client
            .get(detail_ref)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_error)?
            .text()
            .await
            .map_err(request_error)?;

        match self.extract_locator(&body) {
            Some(locator) => {
                debug!(url = detail_ref, %locator, "resolved media locator");
                Ok(locator)
            }
            None => {
                warn!(url = detail_ref, "no media locator on detail page");
                Err(ResolveError::LocatorNotFound {
                    url: detail_ref.to_string(),
                }
                .into())
            }
        }
    }
}
