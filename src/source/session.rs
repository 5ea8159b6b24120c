//! Login handshake and the authenticated client it yields

use crate::config::SourceConfig;
use crate::error::{AuthError, Error, Result};
use crate::utils::mask;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use std::sync::Arc;
use tracing::{debug, info};

/// Logged-in HTTP client for the content site
///
/// Created once per run and shared read-only by catalog and detail fetches.
/// It is not refreshed: an expired session shows up as fetch or resolve
/// failures later in the run.
#[derive(Clone, Debug)]
pub struct AuthenticatedContext {
    client: reqwest::Client,
    session_preview: String,
}

impl AuthenticatedContext {
    /// Wrap a client that already carries the session cookie
    pub fn new(client: reqwest::Client, session_cookie_value: &str) -> Self {
        Self {
            client,
            session_preview: mask(session_cookie_value, 16),
        }
    }

    /// The cookie-carrying client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Masked session cookie, safe to log
    pub fn session_preview(&self) -> &str {
        &self.session_preview
    }
}

/// Performs the two-step login
///
/// 1. GET the anonymous landing page and pull the anti-forgery token out of it
/// 2. POST the credentials plus the token as a form
///
/// Success means the cookie jar now holds the configured session cookie.
pub struct SessionManager {
    config: SourceConfig,
    token_patterns: Vec<Regex>,
}

impl SessionManager {
    /// Create a session manager for the configured site
    ///
    /// # Errors
    /// Returns error if the token patterns fail to compile
    pub fn new(config: SourceConfig) -> Result<Self> {
        let token_patterns = [
            r#"my_webckid["\s:=]+["']?([a-f0-9]{32,})"#,
            r#"name="my_webckid"\s+value="([a-f0-9]{32,})""#,
        ]
        .into_iter()
        .map(|p| {
            Regex::new(p).map_err(|e| Error::Other(format!("invalid token pattern: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            token_patterns,
        })
    }

    /// Pull the anti-forgery token out of the landing page
    pub fn extract_token(&self, body: &str) -> Option<String> {
        self.token_patterns
            .iter()
            .find_map(|re| re.captures(body))
            .map(|caps| caps[1].to_string())
    }

    /// Log in and return the authenticated client
    ///
    /// # Errors
    /// Returns [`AuthError`] if credentials are missing, the landing page or
    /// login request fails, the token is absent, or no session cookie is set.
    pub async fn authenticate(&self) -> Result<AuthenticatedContext> {
        let credentials = &self.config.credentials;
        if !credentials.is_complete() {
            return Err(AuthError::MissingCredentials.into());
        }

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(self.config.user_agent.as_str())
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        let landing_url = self.config.url(&self.config.landing_path);
        debug!(url = %landing_url, "fetching landing page");
        let landing = client
            .get(&landing_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::LandingPage {
                url: landing_url.clone(),
                reason: e.to_string(),
            })?
            .text()
            .await
            .map_err(|e| AuthError::LandingPage {
                url: landing_url.clone(),
                reason: e.to_string(),
            })?;

        let token = self
            .extract_token(&landing)
            .ok_or_else(|| AuthError::TokenNotFound {
                url: landing_url.clone(),
            })?;

        let host = url::Url::parse(&self.config.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let login_url = self.config.url(&self.config.login_path);
        let form = [
            ("my_prevtyp", "S"),
            ("my_prevdom", host.as_str()),
            ("my_prevurl", self.config.landing_path.as_str()),
            ("my_prevmet", "GET"),
            ("my_webckid", token.as_str()),
            ("my_prevprm", ""),
            ("mode", "LOGIN"),
            ("ima", "0000"),
            ("idpwLgid", credentials.login.as_str()),
            ("idpwLgpw", credentials.password.as_str()),
        ];

        debug!(url = %login_url, "submitting login form");
        client
            .post(&login_url)
            .header("Origin", self.config.base_url.trim_end_matches('/'))
            .header("Referer", login_url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::LoginRequest {
                url: login_url.clone(),
                reason: e.to_string(),
            })?;

        let session = self
            .session_cookie(&jar, &landing_url)
            .ok_or_else(|| AuthError::SessionCookieMissing {
                cookie: self.config.session_cookie.clone(),
            })?;

        let context = AuthenticatedContext::new(client, &session);
        info!(session = context.session_preview(), "logged in");
        Ok(context)
    }

    fn session_cookie(&self, jar: &Jar, url: &str) -> Option<String> {
        let url = url::Url::parse(url).ok()?;
        let header = jar.cookies(&url)?;
        let cookies = header.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.config.session_cookie && !value.is_empty()).then(|| value.to_string())
        })
    }
}
