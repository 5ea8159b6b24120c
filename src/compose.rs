//! Still image + audio → video

use crate::config::{Config, MediaConfig};
use crate::error::{ComposeError, Result};
use crate::tools::{CommandRunner, Invocation, ProcessOutcome, Toolchain};
use crate::utils::{excerpt, file_size, is_valid_artifact};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const STDERR_EXCERPT: usize = 200;

/// Builds the composite video with the encoder
///
/// The cover is looped as a one-frame-per-second video stream, scaled to a
/// square frame, and cut at the end of the audio.
pub struct Compositor {
    runner: Arc<dyn CommandRunner>,
    encoder: PathBuf,
    media: MediaConfig,
    timeout: Duration,
}

impl Compositor {
    /// Create a compositor
    pub fn new(config: &Config, toolchain: &Toolchain, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            encoder: toolchain.encoder.clone(),
            media: config.media.clone(),
            timeout: config.tools.encode_timeout,
        }
    }

    /// Encoder invocation for one video
    pub fn invocation(&self, image: &Path, audio: &Path, output: &Path) -> Invocation {
        let size = self.media.frame_size;
        Invocation::new(&self.encoder)
            .arg("-y")
            .opt("-loop", "1")
            .opt("-framerate", "1")
            .opt("-i", image)
            .opt("-i", audio)
            .opt("-c:v", "libx264")
            .opt("-tune", "stillimage")
            .opt("-c:a", "aac")
            .opt("-b:a", self.media.audio_bitrate.as_str())
            .opt("-pix_fmt", "yuv420p")
            .opt("-vf", format!("scale={size}:{size}"))
            .arg("-shortest")
            .opt("-loglevel", "error")
            .arg(output)
    }

    /// Produce `output` unless a valid one already exists
    ///
    /// The encoder writes to a sibling `.partial` file that is renamed onto
    /// `output` only after a zero exit and a size check. A failed or timed out
    /// encode leaves nothing at `output`. A file at `output` at or below the
    /// size threshold is a leftover and gets replaced.
    ///
    /// # Errors
    /// Returns [`ComposeError::MissingCover`] when a new video is needed but
    /// there is no image, [`ComposeError::TimedOut`] when the encoder exceeds
    /// its limit, and [`ComposeError::Failed`] on a non-zero exit or an
    /// undersized result.
    pub async fn compose(&self, image: Option<&Path>, audio: &Path, output: &Path) -> Result<()> {
        if is_valid_artifact(output, self.media.min_video_bytes).await {
            info!(path = ?output, "video already present, skipping composition");
            return Ok(());
        }
        let Some(image) = image else {
            error!(path = ?output, "no cover image, cannot compose");
            return Err(ComposeError::MissingCover {
                output: output.to_path_buf(),
            }
            .into());
        };

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(output);

        info!(path = ?output, "composing video");
        let outcome = self
            .runner
            .run(&self.invocation(image, audio, &partial), self.timeout)
            .await?;
        if let ProcessOutcome::TimedOut { after } = outcome {
            error!(path = ?output, ?after, "encoder timed out");
            discard(&partial).await;
            return Err(ComposeError::TimedOut {
                output: output.to_path_buf(),
                after,
            }
            .into());
        }

        if outcome.succeeded() && is_valid_artifact(&partial, self.media.min_video_bytes).await {
            tokio::fs::rename(&partial, output).await?;
            let size = file_size(output).await.unwrap_or_default();
            info!(
                path = ?output,
                size_mb = %format!("{:.1}", size as f64 / 1024.0 / 1024.0),
                "composition complete"
            );
            return Ok(());
        }

        discard(&partial).await;
        let excerpt = excerpt(outcome.stderr(), STDERR_EXCERPT);
        error!(path = ?output, code = ?outcome.code(), stderr = %excerpt, "composition failed");
        Err(ComposeError::Failed {
            output: output.to_path_buf(),
            code: outcome.code(),
            excerpt,
        }
        .into())
    }
}

/// `EP010.mp4` → `EP010.partial.mp4`; the extension is kept so the encoder
/// still picks the container from it
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    output.with_file_name(format!("{stem}.partial.{ext}"))
}

async fn discard(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!(path = ?partial, "removed partial video"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?partial, error = %e, "could not remove partial video"),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes `bytes` to the last argument, then exits with `code` or times out
    struct FakeEncoder {
        bytes: usize,
        code: i32,
        timed_out: bool,
        runs: AtomicUsize,
    }

    impl FakeEncoder {
        fn new(bytes: usize, code: i32) -> Arc<Self> {
            Arc::new(Self {
                bytes,
                code,
                timed_out: false,
                runs: AtomicUsize::new(0),
            })
        }

        fn timing_out(bytes: usize) -> Arc<Self> {
            Arc::new(Self {
                bytes,
                code: 0,
                timed_out: true,
                runs: AtomicUsize::new(0),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandRunner for FakeEncoder {
        async fn run(&self, invocation: &Invocation, _timeout: Duration) -> crate::Result<ProcessOutcome> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let output = invocation.last_arg().unwrap();
            tokio::fs::write(output, vec![0u8; self.bytes]).await.unwrap();
            if self.timed_out {
                return Ok(ProcessOutcome::TimedOut {
                    after: Duration::from_secs(300),
                });
            }
            Ok(ProcessOutcome::Exited {
                code: Some(self.code),
                stdout: String::new(),
                stderr: "Conversion failed!".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "fake-encoder"
        }
    }

    fn compositor(runner: Arc<dyn CommandRunner>) -> Compositor {
        let toolchain = Toolchain {
            downloader: PathBuf::from("yt-dlp"),
            encoder: PathBuf::from("/usr/bin/ffmpeg"),
            uploader: PathBuf::from("biliup"),
        };
        Compositor::new(&Config::default(), &toolchain, runner)
    }

    #[test]
    fn invocation_loops_still_image_over_audio() {
        let comp = compositor(FakeEncoder::new(0, 0));
        let inv = comp.invocation(
            Path::new("cover/EP001.jpg"),
            Path::new("audio/EP001.m4a"),
            Path::new("video/EP001.mp4"),
        );
        let args: Vec<String> = inv.args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "-y", "-loop", "1", "-framerate", "1", "-i", "cover/EP001.jpg", "-i",
                "audio/EP001.m4a", "-c:v", "libx264", "-tune", "stillimage", "-c:a", "aac",
                "-b:a", "192k", "-pix_fmt", "yuv420p", "-vf", "scale=800:800", "-shortest",
                "-loglevel", "error", "video/EP001.mp4",
            ]
        );
        assert_eq!(inv.program, PathBuf::from("/usr/bin/ffmpeg"));
    }

    #[tokio::test]
    async fn valid_video_is_not_recomposed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("EP010.mp4");
        tokio::fs::write(&output, vec![0u8; 1_000_001]).await.unwrap();
        let encoder = FakeEncoder::new(5_000_000, 0);

        compositor(encoder.clone())
            .compose(None, &dir.path().join("EP010.m4a"), &output)
            .await
            .unwrap();

        assert_eq!(encoder.runs(), 0);
    }

    #[tokio::test]
    async fn undersized_video_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("video").join("EP010.mp4");
        tokio::fs::create_dir_all(output.parent().unwrap()).await.unwrap();
        tokio::fs::write(&output, vec![0u8; 500_000]).await.unwrap();
        let encoder = FakeEncoder::new(5_000_000, 0);

        compositor(encoder.clone())
            .compose(Some(&dir.path().join("EP010.jpg")), &dir.path().join("EP010.m4a"), &output)
            .await
            .unwrap();

        assert_eq!(encoder.runs(), 1);
        assert_eq!(file_size(&output).await, Some(5_000_000));
    }

    #[tokio::test]
    async fn missing_cover_is_compose_error() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(5_000_000, 0);

        let err = compositor(encoder.clone())
            .compose(None, &dir.path().join("EP010.m4a"), &dir.path().join("EP010.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Compose(ComposeError::MissingCover { .. })));
        assert_eq!(encoder.runs(), 0);
    }

    #[tokio::test]
    async fn non_zero_exit_fails_even_with_large_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = compositor(FakeEncoder::new(5_000_000, 1))
            .compose(
                Some(&dir.path().join("EP010.jpg")),
                &dir.path().join("EP010.m4a"),
                &dir.path().join("EP010.mp4"),
            )
            .await
            .unwrap_err();

        match err {
            Error::Compose(ComposeError::Failed { code, excerpt, .. }) => {
                assert_eq!(code, Some(1));
                assert_eq!(excerpt, "Conversion failed!");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(!dir.path().join("EP010.mp4").exists());
        assert!(!dir.path().join("EP010.partial.mp4").exists());
    }

    #[tokio::test]
    async fn failed_encode_is_redone_on_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("EP010.jpg");
        let audio = dir.path().join("EP010.m4a");
        let output = dir.path().join("EP010.mp4");

        let crashed = FakeEncoder::new(3_000_000, 1);
        compositor(crashed.clone())
            .compose(Some(&image), &audio, &output)
            .await
            .unwrap_err();
        assert_eq!(crashed.runs(), 1);
        assert_eq!(file_size(&output).await, None);

        let healthy = FakeEncoder::new(5_000_000, 0);
        compositor(healthy.clone())
            .compose(Some(&image), &audio, &output)
            .await
            .unwrap();
        assert_eq!(healthy.runs(), 1);
        assert_eq!(file_size(&output).await, Some(5_000_000));
    }

    #[tokio::test]
    async fn encoder_timeout_is_compose_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("EP011.jpg");
        let audio = dir.path().join("EP011.m4a");
        let output = dir.path().join("EP011.mp4");
        let encoder = FakeEncoder::timing_out(3_000_000);
        let comp = compositor(encoder.clone());

        let err = comp.compose(Some(&image), &audio, &output).await.unwrap_err();
        assert!(matches!(err, Error::Compose(ComposeError::TimedOut { .. })));
        assert_eq!(err.stage(), Some(crate::types::Stage::Composing));
        assert!(!output.exists());
        assert!(!dir.path().join("EP011.partial.mp4").exists());

        // Nothing was accepted, so the next attempt encodes again
        comp.compose(Some(&image), &audio, &output).await.unwrap_err();
        assert_eq!(encoder.runs(), 2);
    }

    #[test]
    fn partial_path_keeps_container_extension() {
        assert_eq!(
            partial_path(Path::new("/srv/radio_video/EP200.mp4")),
            PathBuf::from("/srv/radio_video/EP200.partial.mp4")
        );
    }

    #[tokio::test]
    async fn small_output_fails_despite_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let err = compositor(FakeEncoder::new(1_000, 0))
            .compose(
                Some(&dir.path().join("EP010.jpg")),
                &dir.path().join("EP010.m4a"),
                &dir.path().join("EP010.mp4"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Compose(ComposeError::Failed { code: Some(0), .. })));
    }
}
