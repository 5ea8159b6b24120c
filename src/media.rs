//! Audio and cover acquisition
//!
//! Both artifacts are keyed by episode number (`EP200.m4a`, `EP200.jpg`) and
//! reused when already present, so a rerun after a later-stage failure does
//! not download again.

use crate::config::{Config, MediaConfig};
use crate::error::{DownloadError, Error, Result};
use crate::tools::{CommandRunner, Invocation, ProcessOutcome, Toolchain};
use crate::types::{EpisodeNumber, MediaLocator};
use crate::utils::{excerpt, file_size, find_artifact, write_atomic};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Extensions accepted as an existing cover
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Downloader stderr kept in errors and logs
const STDERR_EXCERPT: usize = 200;

/// Downloads the audio track and the cover image for an episode
pub struct MediaAcquirer {
    runner: Arc<dyn CommandRunner>,
    http: reqwest::Client,
    media: MediaConfig,
    downloader: PathBuf,
    download_timeout: Duration,
    audio_dir: PathBuf,
    cover_dir: PathBuf,
    size_suffix: Regex,
}

impl MediaAcquirer {
    /// Create an acquirer writing into the configured artifact directories
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &Config, toolchain: &Toolchain, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        // The image host rejects the site's mobile user agent string
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(config.media.cover_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        let size_suffix = Regex::new(r"/\d+_\d+_\d+$")
            .map_err(|e| Error::Other(format!("invalid cover pattern: {}", e)))?;

        Ok(Self {
            runner,
            http,
            media: config.media.clone(),
            downloader: toolchain.downloader.clone(),
            download_timeout: config.tools.download_timeout,
            audio_dir: config.storage.audio_path(),
            cover_dir: config.storage.cover_path(),
            size_suffix,
        })
    }

    /// Rewrite a cover URL to request the large rendition
    ///
    /// Image URLs end in `/{width}_{height}_{quality}`; that tail is replaced
    /// with the configured suffix. URLs without it are returned unchanged.
    pub fn upgrade_cover_url(&self, url: &str) -> String {
        self.size_suffix
            .replace(url, self.media.cover_size_suffix.as_str())
            .into_owned()
    }

    /// Player page URL the downloader is pointed at
    pub fn player_url(&self, locator: &MediaLocator) -> String {
        self.media.player_url_template.replace("{id}", locator.as_str())
    }

    /// Local audio artifact for `episode`, downloading it if needed
    ///
    /// # Errors
    /// Returns [`DownloadError::TimedOut`] if the downloader exceeds its limit
    /// and [`DownloadError::NoOutput`] if it leaves no file above the size
    /// threshold.
    pub async fn acquire_audio(&self, locator: &MediaLocator, episode: EpisodeNumber) -> Result<PathBuf> {
        let stem = episode.artifact_stem();
        if let Some(existing) = self.existing_audio(&stem).await {
            info!(episode = episode.get(), path = ?existing, "audio already present, skipping download");
            return Ok(existing);
        }

        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let template = self.audio_dir.join(format!("{stem}.%(ext)s"));
        let invocation = Invocation::new(&self.downloader)
            .opt("-f", "bestaudio")
            .opt("-o", template)
            .arg("--no-warnings")
            .arg("--quiet")
            .arg(self.player_url(locator));

        info!(episode = episode.get(), %locator, "downloading audio");
        let outcome = self.runner.run(&invocation, self.download_timeout).await?;
        if let ProcessOutcome::TimedOut { after } = outcome {
            error!(episode = episode.get(), ?after, "audio download timed out");
            return Err(DownloadError::TimedOut { episode, after }.into());
        }

        match self.existing_audio(&stem).await {
            Some(path) => {
                let size = file_size(&path).await.unwrap_or_default();
                info!(
                    episode = episode.get(),
                    ?path,
                    size_mb = %format!("{:.1}", size as f64 / 1024.0 / 1024.0),
                    "audio downloaded"
                );
                Ok(path)
            }
            None => {
                let excerpt = excerpt(outcome.stderr(), STDERR_EXCERPT);
                error!(episode = episode.get(), code = ?outcome.code(), stderr = %excerpt, "audio download failed");
                Err(DownloadError::NoOutput {
                    episode,
                    min_bytes: self.media.min_audio_bytes,
                    excerpt,
                }
                .into())
            }
        }
    }

    /// Local cover artifact for `episode`, fetching it if needed
    ///
    /// `Ok(None)` means no cover is available because no reference was
    /// supplied; that is not an error here, composition decides what it means.
    ///
    /// # Errors
    /// Returns [`DownloadError::Cover`] if the fetch fails or returns a non-success status
    pub async fn acquire_cover(&self, image_ref: Option<&str>, episode: EpisodeNumber) -> Result<Option<PathBuf>> {
        let stem = episode.artifact_stem();
        if let Some(existing) = self.existing_cover(&stem).await {
            info!(episode = episode.get(), path = ?existing, "cover already present");
            return Ok(Some(existing));
        }

        let Some(image_ref) = image_ref.filter(|r| !r.trim().is_empty()) else {
            warn!(episode = episode.get(), "no cover reference");
            return Ok(None);
        };

        let url = self.upgrade_cover_url(image_ref);
        debug!(episode = episode.get(), %url, "fetching cover");
        let cover_error = |e: reqwest::Error| DownloadError::Cover {
            url: url.clone(),
            reason: e.to_string(),
        };
        let bytes = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(cover_error)?
            .bytes()
            .await
            .map_err(cover_error)?;

        // A partial write must never be visible under the name the reuse check looks for
        let path = self.cover_dir.join(format!("{stem}.jpg"));
        write_atomic(&path, &bytes).await?;
        info!(episode = episode.get(), ?path, bytes = bytes.len(), "cover downloaded");
        Ok(Some(path))
    }

    async fn existing_audio(&self, stem: &str) -> Option<PathBuf> {
        find_artifact(&self.audio_dir, stem, &self.media.audio_extensions, self.media.min_audio_bytes).await
    }

    async fn existing_cover(&self, stem: &str) -> Option<PathBuf> {
        let extensions: Vec<String> = COVER_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        find_artifact(&self.cover_dir, stem, &extensions, 0).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Writes `bytes` to the downloader's output template with extension `ext`
    struct ScriptedDownloader {
        ext: &'static str,
        bytes: usize,
        timed_out: bool,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedDownloader {
        fn writing(ext: &'static str, bytes: usize) -> Arc<Self> {
            Arc::new(Self {
                ext,
                bytes,
                timed_out: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedDownloader {
        async fn run(&self, invocation: &Invocation, timeout: Duration) -> crate::Result<ProcessOutcome> {
            self.calls.lock().unwrap().push(invocation.clone());
            if self.timed_out {
                return Ok(ProcessOutcome::TimedOut { after: timeout });
            }
            let template = invocation.value_of("-o").unwrap().to_string_lossy().into_owned();
            let target = template.replace("%(ext)s", self.ext);
            tokio::fs::write(target, vec![0u8; self.bytes]).await.unwrap();
            Ok(ProcessOutcome::Exited {
                code: Some(0),
                stdout: String::new(),
                stderr: "ERROR: fragment 3 not found".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn config(dir: &TempDir) -> Config {
        Config {
            storage: StorageConfig {
                base_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn acquirer(dir: &TempDir, runner: Arc<dyn CommandRunner>) -> MediaAcquirer {
        let config = config(dir);
        let toolchain = Toolchain {
            downloader: PathBuf::from("yt-dlp"),
            encoder: PathBuf::from("ffmpeg"),
            uploader: PathBuf::from("biliup"),
        };
        MediaAcquirer::new(&config, &toolchain, runner).unwrap()
    }

    fn ep(n: u32) -> EpisodeNumber {
        EpisodeNumber::new(n).unwrap()
    }

    #[tokio::test]
    async fn downloads_audio_with_player_url() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedDownloader::writing("m4a", 2_000_000);
        let media = acquirer(&dir, runner.clone());

        let path = media
            .acquire_audio(&MediaLocator("6350000000001".into()), ep(7))
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("radio_audio").join("EP007.m4a"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].value_of("-f").unwrap(), "bestaudio");
        assert_eq!(
            calls[0].last_arg().unwrap(),
            Path::new("https://players.brightcove.net/4504957038001/default_default/index.html?videoId=6350000000001")
        );
    }

    #[tokio::test]
    async fn existing_audio_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let audio_dir = dir.path().join("radio_audio");
        tokio::fs::create_dir_all(&audio_dir).await.unwrap();
        tokio::fs::write(audio_dir.join("EP042.webm"), vec![0u8; 150_000])
            .await
            .unwrap();
        let runner = ScriptedDownloader::writing("m4a", 2_000_000);
        let media = acquirer(&dir, runner.clone());

        let path = media.acquire_audio(&MediaLocator("1".into()), ep(42)).await.unwrap();

        assert_eq!(path, audio_dir.join("EP042.webm"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn undersized_download_is_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let media = acquirer(&dir, ScriptedDownloader::writing("m4a", 100_000));

        let err = media
            .acquire_audio(&MediaLocator("1".into()), ep(3))
            .await
            .unwrap_err();

        match err {
            Error::Download(DownloadError::NoOutput { excerpt, min_bytes, .. }) => {
                assert_eq!(min_bytes, 100_000);
                assert_eq!(excerpt, "ERROR: fragment 3 not found");
            }
            other => panic!("expected NoOutput, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn downloader_timeout_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedDownloader {
            ext: "m4a",
            bytes: 0,
            timed_out: true,
            calls: Mutex::new(Vec::new()),
        });
        let media = acquirer(&dir, runner);

        let err = media
            .acquire_audio(&MediaLocator("1".into()), ep(3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Download(DownloadError::TimedOut { .. })));
        assert_eq!(err.stage(), Some(crate::types::Stage::Acquiring));
    }

    #[test]
    fn cover_url_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let media = acquirer(&dir, ScriptedDownloader::writing("m4a", 0));
        assert_eq!(
            media.upgrade_cover_url("https://cdn.example.com/images/14/abc.jpg/400_320_102400"),
            "https://cdn.example.com/images/14/abc.jpg/800_800_102400"
        );
        assert_eq!(
            media.upgrade_cover_url("https://cdn.example.com/images/plain.jpg"),
            "https://cdn.example.com/images/plain.jpg"
        );
    }

    #[tokio::test]
    async fn cover_is_fetched_at_large_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/14/abc.jpg/800_800_102400"))
            .and(header("user-agent", "Mozilla/5.0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFFu8, 0xD8, 0xFF, 0xE0]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let media = acquirer(&dir, ScriptedDownloader::writing("m4a", 0));
        let url = format!("{}/images/14/abc.jpg/400_320_102400", server.uri());

        let path = media.acquire_cover(Some(&url), ep(200)).await.unwrap().unwrap();
        assert_eq!(path, dir.path().join("radio_cover").join("EP200.jpg"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), vec![0xFF, 0xD8, 0xFF, 0xE0]);

        // Second call reuses the file without another request
        let again = media.acquire_cover(Some(&url), ep(200)).await.unwrap();
        assert_eq!(again, Some(path));
    }

    #[tokio::test]
    async fn missing_cover_reference_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let media = acquirer(&dir, ScriptedDownloader::writing("m4a", 0));
        assert_eq!(media.acquire_cover(None, ep(5)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn leftover_partial_cover_is_not_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/ep9.jpg/800_800_102400"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFFu8; 2048]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cover_dir = dir.path().join("radio_cover");
        tokio::fs::create_dir_all(&cover_dir).await.unwrap();
        // What an interrupted write leaves behind
        tokio::fs::write(cover_dir.join(".EP009.jpg.tmp"), vec![0xFFu8; 17])
            .await
            .unwrap();
        let media = acquirer(&dir, ScriptedDownloader::writing("m4a", 0));

        assert_eq!(media.acquire_cover(None, ep(9)).await.unwrap(), None);

        let url = format!("{}/images/ep9.jpg/400_320_102400", server.uri());
        let path = media.acquire_cover(Some(&url), ep(9)).await.unwrap().unwrap();
        assert_eq!(path, cover_dir.join("EP009.jpg"));
        assert_eq!(tokio::fs::read(&path).await.unwrap().len(), 2048);
        assert!(!cover_dir.join(".EP009.jpg.tmp").exists());
    }

    #[tokio::test]
    async fn cover_error_status_is_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let media = acquirer(&dir, ScriptedDownloader::writing("m4a", 0));
        let url = format!("{}/images/gone.jpg", server.uri());

        let err = media.acquire_cover(Some(&url), ep(5)).await.unwrap_err();
        assert!(matches!(err, Error::Download(DownloadError::Cover { .. })));
        assert!(!dir.path().join("radio_cover").join("EP005.jpg").exists());
    }
}
