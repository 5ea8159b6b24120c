//! Utility functions for artifact files and diagnostic output

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Size of a regular file, or `None` if it does not exist or is not a file
pub async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Whether an artifact exists and is strictly larger than `min_bytes`
///
/// Undersized files are what a truncated download or an interrupted encode
/// leaves behind; they count as absent so the stage reruns and overwrites them.
pub async fn is_valid_artifact(path: &Path, min_bytes: u64) -> bool {
    file_size(path).await.is_some_and(|len| len > min_bytes)
}

/// First `dir/stem.ext` (in `extensions` order) that passes [`is_valid_artifact`]
pub async fn find_artifact(
    dir: &Path,
    stem: &str,
    extensions: &[String],
    min_bytes: u64,
) -> Option<PathBuf> {
    for ext in extensions {
        let candidate = dir.join(format!("{stem}.{ext}"));
        if is_valid_artifact(&candidate, min_bytes).await {
            return Some(candidate);
        }
    }
    None
}

/// Truncate tool output for log lines and error messages
///
/// Cuts on a character boundary and trims surrounding whitespace.
///
/// # Examples
///
/// ```
/// use sakumimi_relay::utils::excerpt;
///
/// assert_eq!(excerpt("  short  ", 200), "short");
/// assert_eq!(excerpt("合成失败: boom", 4), "合成失败…");
/// ```
#[must_use]
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Replace `path` with `contents` via a sibling temporary file and a rename
///
/// Readers never observe a half-written file; a crash leaves either the old
/// contents or the new ones.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = temp_sibling(path);
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Mask a secret for logging, keeping at most `keep` leading characters
///
/// # Examples
///
/// ```
/// use sakumimi_relay::utils::mask;
///
/// assert_eq!(mask("0123456789abcdef0123", 16), "0123456789abcdef...");
/// assert_eq!(mask("abc", 16), "abc...");
/// ```
#[must_use]
pub fn mask(secret: &str, keep: usize) -> String {
    let prefix: String = secret.chars().take(keep).collect();
    format!("{prefix}...")
}
