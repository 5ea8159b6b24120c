//! Scripted stand-ins for the content site and the external tools

use async_trait::async_trait;
use sakumimi_relay::{
    AuthError, AuthenticatedContext, CommandRunner, ContentSource, Episode, FetchError,
    Invocation, MediaLocator, ProcessOutcome, ResolveError, Result,
};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Content source returning a fixed listing and locator table
#[derive(Default)]
pub struct FakeSource {
    episodes: Mutex<Vec<Episode>>,
    locators: Mutex<HashMap<String, MediaLocator>>,
    auth_fails: AtomicBool,
    listing_fails: AtomicBool,
    logins: AtomicUsize,
    resolved: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing (source order)
    pub fn set_listing(&self, episodes: Vec<Episode>) {
        *self.episodes.lock().unwrap() = episodes;
    }

    /// Make `detail_ref` resolve to `locator`
    pub fn add_locator(&self, detail_ref: &str, locator: &str) {
        self.locators
            .lock()
            .unwrap()
            .insert(detail_ref.to_string(), MediaLocator(locator.to_string()));
    }

    pub fn fail_auth(&self) {
        self.auth_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_listing(&self) {
        self.listing_fails.store(true, Ordering::SeqCst);
    }

    /// Number of login attempts
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Detail references resolved so far
    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn authenticate(&self) -> Result<AuthenticatedContext> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.auth_fails.load(Ordering::SeqCst) {
            return Err(AuthError::TokenNotFound {
                url: "fake://landing".to_string(),
            }
            .into());
        }
        Ok(AuthenticatedContext::new(
            reqwest::Client::new(),
            "fake-session-cookie-value",
        ))
    }

    async fn list_recent_episodes(
        &self,
        _context: &AuthenticatedContext,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(FetchError::TooShort { len: 512, min: 10_000 }.into());
        }
        let mut episodes = self.episodes.lock().unwrap().clone();
        episodes.truncate(limit);
        Ok(episodes)
    }

    async fn resolve_media_locator(
        &self,
        _context: Option<&AuthenticatedContext>,
        detail_ref: &str,
    ) -> Result<MediaLocator> {
        self.resolved.lock().unwrap().push(detail_ref.to_string());
        self.locators
            .lock()
            .unwrap()
            .get(detail_ref)
            .cloned()
            .ok_or_else(|| {
                ResolveError::LocatorNotFound {
                    url: detail_ref.to_string(),
                }
                .into()
            })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Runner that imitates yt-dlp, ffmpeg and biliup by program name
///
/// - the downloader writes `audio_bytes` to its `-o` template as `.m4a`
/// - the encoder writes to its last argument, then exits with the next
///   scripted code (0 once the script is exhausted); a failing run still
///   leaves a sizeable partial file, as a crashed encode does
/// - the uploader prints `upload_stdout` and exits with `upload_exit`
pub struct FakeRunner {
    invocations: Mutex<Vec<Invocation>>,
    pub audio_bytes: usize,
    pub video_bytes: usize,
    encoder_exits: Mutex<VecDeque<i32>>,
    upload_stdout: Mutex<String>,
    upload_exit: Mutex<i32>,
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            audio_bytes: 2 * 1024 * 1024,
            video_bytes: 5 * 1024 * 1024,
            encoder_exits: Mutex::new(VecDeque::new()),
            upload_stdout: Mutex::new("投稿成功 BV1Rs4y1X7ab\n".to_string()),
            upload_exit: Mutex::new(0),
        }
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit codes for the next encoder runs, in order
    pub fn script_encoder(&self, codes: &[i32]) {
        self.encoder_exits.lock().unwrap().extend(codes.iter().copied());
    }

    pub fn set_upload_output(&self, stdout: &str) {
        *self.upload_stdout.lock().unwrap() = stdout.to_string();
    }

    pub fn set_upload_exit(&self, code: i32) {
        *self.upload_exit.lock().unwrap() = code;
    }

    /// All invocations so far
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Invocations of one tool, by program name
    pub fn runs_of(&self, tool: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.program_name() == tool)
            .collect()
    }

    pub fn count(&self, tool: &str) -> usize {
        self.runs_of(tool).len()
    }

    /// Video paths handed to the uploader, in order
    pub fn uploaded_videos(&self) -> Vec<PathBuf> {
        self.runs_of("biliup")
            .iter()
            .filter_map(|inv| inv.last_arg().map(|p| p.to_path_buf()))
            .collect()
    }

    fn exited(code: i32, stdout: String, stderr: &str) -> ProcessOutcome {
        ProcessOutcome::Exited {
            code: Some(code),
            stdout,
            stderr: stderr.to_string(),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation, _timeout: Duration) -> Result<ProcessOutcome> {
        self.invocations.lock().unwrap().push(invocation.clone());

        match invocation.program_name().as_str() {
            "yt-dlp" => {
                let template = invocation
                    .value_of("-o")
                    .map(|t| t.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let target = template.replace("%(ext)s", "m4a");
                tokio::fs::write(&target, vec![0u8; self.audio_bytes]).await?;
                Ok(Self::exited(0, String::new(), ""))
            }
            "ffmpeg" => {
                let code = self.encoder_exits.lock().unwrap().pop_front().unwrap_or(0);
                if let Some(output) = invocation.last_arg() {
                    let bytes = if code == 0 { self.video_bytes } else { 3_000_000 };
                    tokio::fs::write(output, vec![0u8; bytes]).await?;
                }
                let stderr = if code == 0 { "" } else { "Error while opening encoder" };
                Ok(Self::exited(code, String::new(), stderr))
            }
            "biliup" => {
                let code = *self.upload_exit.lock().unwrap();
                let stdout = self.upload_stdout.lock().unwrap().clone();
                let stderr = if code == 0 { "" } else { "上传失败: 412 Precondition Failed" };
                Ok(Self::exited(code, stdout, stderr))
            }
            other => panic!("unexpected program {other}"),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
