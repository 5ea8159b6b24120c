//! Configuration and on-disk fixtures

use super::fakes::{FakeRunner, FakeSource};
use sakumimi_relay::config::{StorageConfig, ToolsConfig};
use sakumimi_relay::{Config, Episode, EpisodeNumber, Orchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration rooted at `base_dir` with bare tool names (no PATH lookup)
pub fn test_config(base_dir: &Path) -> Config {
    Config {
        storage: StorageConfig {
            base_dir: base_dir.to_path_buf(),
            ..Default::default()
        },
        tools: ToolsConfig {
            search_path: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn ep(n: u32) -> EpisodeNumber {
    EpisodeNumber::new(n).unwrap()
}

/// Episode with a pre-resolved locator and no cover reference
pub fn resolved_episode(n: u32) -> Episode {
    let mut episode = Episode::new(ep(n), format!("D{n}"));
    episode.locator = Some(sakumimi_relay::MediaLocator(format!("V{n}")));
    episode
}

pub async fn orchestrator(
    config: Config,
    source: &Arc<FakeSource>,
    runner: &Arc<FakeRunner>,
) -> Orchestrator {
    Orchestrator::new(config, source.clone(), runner.clone())
        .await
        .unwrap()
}

pub fn audio_file(base: &Path, n: u32) -> PathBuf {
    base.join("radio_audio").join(format!("EP{n:03}.m4a"))
}

pub fn cover_file(base: &Path, n: u32) -> PathBuf {
    base.join("radio_cover").join(format!("EP{n:03}.jpg"))
}

pub fn video_file(base: &Path, n: u32) -> PathBuf {
    base.join("radio_video").join(format!("EP{n:03}.mp4"))
}

/// Write `bytes` zero bytes at `path`, creating parent directories
pub async fn write_sized(path: &Path, bytes: usize) {
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(path, vec![0u8; bytes]).await.unwrap();
}

/// Place a cover so composition can run without a cover fetch
pub async fn seed_cover(base: &Path, n: u32) {
    write_sized(&cover_file(base, n), 2048).await;
}

pub async fn write_state(base: &Path, json: &str) {
    tokio::fs::write(base.join("sakuradio_state.json"), json)
        .await
        .unwrap();
}

pub async fn read_state(base: &Path) -> serde_json::Value {
    let raw = tokio::fs::read_to_string(base.join("sakuradio_state.json"))
        .await
        .unwrap();
    serde_json::from_str(&raw).unwrap()
}
