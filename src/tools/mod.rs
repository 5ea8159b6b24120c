//! External tools: downloader (yt-dlp), encoder (ffmpeg), publisher (biliup)
//!
//! Every launch goes through a [`CommandRunner`] and comes back as a
//! [`ProcessOutcome`], with timeouts as a first-class outcome.

use crate::config::ToolsConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

mod system;
mod traits;

pub use system::SystemRunner;
pub use traits::{CommandRunner, Invocation, ProcessOutcome};

/// Binary name of the audio downloader
pub const DOWNLOADER: &str = "yt-dlp";
/// Binary name of the encoder
pub const ENCODER: &str = "ffmpeg";
/// Binary name of the publishing tool
pub const UPLOADER: &str = "biliup";

/// Pick the binary to launch for `name`
///
/// An explicit path wins. Otherwise, when `search_path` is set, the `which`
/// crate looks the binary up on PATH. If that fails too the bare name is
/// returned and the launch error surfaces at run time.
pub fn resolve_tool(explicit: Option<&Path>, name: &str, search_path: bool) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if search_path && let Ok(found) = which::which(name) {
        debug!(tool = name, path = ?found, "found tool on PATH");
        return found;
    }
    PathBuf::from(name)
}

/// Resolved locations of the three tools
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toolchain {
    /// Audio downloader
    pub downloader: PathBuf,
    /// Encoder
    pub encoder: PathBuf,
    /// Publishing tool
    pub uploader: PathBuf,
}

impl Toolchain {
    /// Resolve all tools from configuration
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            downloader: resolve_tool(tools.downloader_path.as_deref(), DOWNLOADER, tools.search_path),
            encoder: resolve_tool(tools.encoder_path.as_deref(), ENCODER, tools.search_path),
            uploader: resolve_tool(tools.uploader_path.as_deref(), UPLOADER, tools.search_path),
        }
    }
}
