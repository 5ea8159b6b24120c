//! Configuration types for sakumimi-relay
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a
//! complete configuration apart from the site credentials, which normally come
//! from the environment.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the site login
pub const LOGIN_ENV: &str = "SAKUMIMI_LOGIN";
/// Environment variable holding the site password
pub const PASSWORD_ENV: &str = "SAKUMIMI_PASSWORD";

/// Site login credentials
///
/// `Debug` redacts the password so the struct can be logged with the rest of
/// the configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Login (e-mail address)
    #[serde(default)]
    pub login: String,
    /// Password
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    /// Both halves present
    pub fn is_complete(&self) -> bool {
        !self.login.is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Content site settings (authentication, catalog, detail pages)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Site origin (default: "https://sakurazaka46.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Anonymous landing page carrying the anti-forgery token
    #[serde(default = "default_landing_path")]
    pub landing_path: String,

    /// Login form target
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Radio listing page
    #[serde(default = "default_listing_path")]
    pub listing_path: String,

    /// Prefix of episode detail pages; the entry id and `?ima=0000` are appended
    #[serde(default = "default_detail_path_prefix")]
    pub detail_path_prefix: String,

    /// Cookie whose presence proves a successful login
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Listing bodies shorter than this are the login-wall variant (default: 10000)
    #[serde(default = "default_min_listing_bytes")]
    pub min_listing_bytes: usize,

    /// User-Agent sent with every site request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for landing, login and detail requests (default: 15s)
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,

    /// Timeout for the listing request (default: 20s)
    #[serde(default = "default_listing_timeout", with = "duration_secs")]
    pub listing_timeout: Duration,

    /// Site credentials (overridden by SAKUMIMI_LOGIN / SAKUMIMI_PASSWORD)
    #[serde(default)]
    pub credentials: Credentials,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            landing_path: default_landing_path(),
            login_path: default_login_path(),
            listing_path: default_listing_path(),
            detail_path_prefix: default_detail_path_prefix(),
            session_cookie: default_session_cookie(),
            min_listing_bytes: default_min_listing_bytes(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            listing_timeout: default_listing_timeout(),
            credentials: Credentials::default(),
        }
    }
}

impl SourceConfig {
    /// Absolute URL for a site path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Detail page URL for a catalog entry id
    pub fn detail_url(&self, entry_id: &str) -> String {
        self.url(&format!("{}{}?ima=0000", self.detail_path_prefix, entry_id))
    }
}

/// On-disk layout: ledger, override mapping and artifact directories
///
/// Relative paths are resolved against `base_dir`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Working directory for everything below (default: ".")
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Progress ledger (default: "sakuradio_state.json")
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Optional manual override mapping (default: "radio_mapping.json")
    #[serde(default = "default_mapping_file")]
    pub mapping_file: PathBuf,

    /// Cover images (default: "radio_cover")
    #[serde(default = "default_cover_dir")]
    pub cover_dir: PathBuf,

    /// Audio tracks (default: "radio_audio")
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,

    /// Composite videos (default: "radio_video")
    #[serde(default = "default_video_dir")]
    pub video_dir: PathBuf,

    /// Log file written alongside console output (None = console only)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            state_file: default_state_file(),
            mapping_file: default_mapping_file(),
            cover_dir: default_cover_dir(),
            audio_dir: default_audio_dir(),
            video_dir: default_video_dir(),
            log_file: None,
        }
    }
}

impl StorageConfig {
    /// Resolve a configured path against `base_dir`
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Resolved ledger path
    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.state_file)
    }

    /// Resolved mapping path
    pub fn mapping_path(&self) -> PathBuf {
        self.resolve(&self.mapping_file)
    }

    /// Resolved cover directory
    pub fn cover_path(&self) -> PathBuf {
        self.resolve(&self.cover_dir)
    }

    /// Resolved audio directory
    pub fn audio_path(&self) -> PathBuf {
        self.resolve(&self.audio_dir)
    }

    /// Resolved video directory
    pub fn video_path(&self) -> PathBuf {
        self.resolve(&self.video_dir)
    }

    /// Resolved log file, if any
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(|p| self.resolve(p))
    }
}

/// External tool paths and their wall-clock limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to yt-dlp (auto-detected if None)
    #[serde(default)]
    pub downloader_path: Option<PathBuf>,

    /// Path to ffmpeg (auto-detected if None)
    #[serde(default)]
    pub encoder_path: Option<PathBuf>,

    /// Path to biliup (auto-detected if None)
    #[serde(default)]
    pub uploader_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Audio download limit (default: 180s)
    #[serde(default = "default_download_timeout", with = "duration_secs")]
    pub download_timeout: Duration,

    /// Encoding limit (default: 300s)
    #[serde(default = "default_encode_timeout", with = "duration_secs")]
    pub encode_timeout: Duration,

    /// Upload limit (default: 1800s)
    #[serde(default = "default_upload_timeout", with = "duration_secs")]
    pub upload_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            downloader_path: None,
            encoder_path: None,
            uploader_path: None,
            search_path: true,
            download_timeout: default_download_timeout(),
            encode_timeout: default_encode_timeout(),
            upload_timeout: default_upload_timeout(),
        }
    }
}

/// Media acquisition and composition settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Player page the downloader is pointed at; `{id}` is the media locator
    #[serde(default = "default_player_url_template")]
    pub player_url_template: String,

    /// Extensions the downloader may produce, in lookup order
    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,

    /// Audio files at or below this size are treated as absent (default: 100000)
    #[serde(default = "default_min_audio_bytes")]
    pub min_audio_bytes: u64,

    /// Videos at or below this size are treated as absent (default: 1000000)
    #[serde(default = "default_min_video_bytes")]
    pub min_video_bytes: u64,

    /// Path suffix that selects the high-resolution cover variant
    #[serde(default = "default_cover_size_suffix")]
    pub cover_size_suffix: String,

    /// Cover fetch timeout (default: 30s)
    #[serde(default = "default_cover_timeout", with = "duration_secs")]
    pub cover_timeout: Duration,

    /// Square frame edge in pixels (default: 800)
    #[serde(default = "default_frame_size")]
    pub frame_size: u32,

    /// Audio bitrate passed to the encoder (default: "192k")
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            player_url_template: default_player_url_template(),
            audio_extensions: default_audio_extensions(),
            min_audio_bytes: default_min_audio_bytes(),
            min_video_bytes: default_min_video_bytes(),
            cover_size_suffix: default_cover_size_suffix(),
            cover_timeout: default_cover_timeout(),
            frame_size: default_frame_size(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

/// Publication metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Title; `{ep}` is replaced by the episode number
    #[serde(default = "default_title_template")]
    pub title_template: String,

    /// Description; `{ep}` and `{summary}` are replaced
    #[serde(default = "default_description_template")]
    pub description_template: String,

    /// Comma-separated tag list
    #[serde(default = "default_tags")]
    pub tags: String,

    /// Platform category id (default: 31)
    #[serde(default = "default_category")]
    pub category: u32,

    /// Copyright classification (default: 2, repost)
    #[serde(default = "default_copyright")]
    pub copyright: u8,

    /// Attribution link for reposts
    #[serde(default = "default_source_url")]
    pub source_url: String,

    /// Identifier recorded when the tool succeeds without printing one
    #[serde(default = "default_placeholder_id")]
    pub placeholder_id: String,

    /// Pattern matched against the tool's output to find the video id
    #[serde(default = "default_id_pattern")]
    pub id_pattern: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            title_template: default_title_template(),
            description_template: default_description_template(),
            tags: default_tags(),
            category: default_category(),
            copyright: default_copyright(),
            source_url: default_source_url(),
            placeholder_id: default_placeholder_id(),
            id_pattern: default_id_pattern(),
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Content site access
    #[serde(default)]
    pub source: SourceConfig,

    /// On-disk layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// External binaries and limits
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Acquisition and composition
    #[serde(default)]
    pub media: MediaConfig,

    /// Publication metadata
    #[serde(default)]
    pub publish: PublishConfig,

    /// How many of the newest catalog entries a check cycle inspects (default: 5)
    #[serde(default = "default_check_limit")]
    pub check_limit: usize,
}

impl Config {
    /// Load from a JSON file, then apply environment overrides
    ///
    /// A missing file is an error here; callers that want "defaults if absent"
    /// use [`Config::load_or_default`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let mut config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.apply_env();
        Ok(config)
    }

    /// Load `path` if given, otherwise defaults; environment overrides apply either way
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let mut config = Config::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    /// Overlay credentials from the process environment
    ///
    /// Reading a `.env` file into the environment is left to the binary.
    pub fn apply_env(&mut self) {
        if let Ok(login) = std::env::var(LOGIN_ENV)
            && !login.is_empty()
        {
            self.source.credentials.login = login;
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV)
            && !password.is_empty()
        {
            self.source.credentials.password = password;
        }
    }

    /// Reject settings that would make every run fail in a confusing way
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("source.request_timeout", self.source.request_timeout),
            ("source.listing_timeout", self.source.listing_timeout),
            ("tools.download_timeout", self.tools.download_timeout),
            ("tools.encode_timeout", self.tools.encode_timeout),
            ("tools.upload_timeout", self.tools.upload_timeout),
            ("media.cover_timeout", self.media.cover_timeout),
        ];
        for (key, value) in timeouts {
            if value.is_zero() {
                return Err(Error::config("timeout must be greater than zero", key));
            }
        }

        if url::Url::parse(&self.source.base_url).is_err() {
            return Err(Error::config(
                format!("invalid base URL {:?}", self.source.base_url),
                "source.base_url",
            ));
        }
        if !self.media.player_url_template.contains("{id}") {
            return Err(Error::config(
                "player URL template must contain {id}",
                "media.player_url_template",
            ));
        }
        if self.media.audio_extensions.is_empty() {
            return Err(Error::config(
                "at least one audio extension is required",
                "media.audio_extensions",
            ));
        }
        if self.publish.title_template.trim().is_empty() {
            return Err(Error::config("title template is empty", "publish.title_template"));
        }
        if self.publish.placeholder_id.trim().is_empty() {
            return Err(Error::config("placeholder id is empty", "publish.placeholder_id"));
        }
        if let Err(e) = regex::Regex::new(&self.publish.id_pattern) {
            return Err(Error::config(
                format!("invalid id pattern: {e}"),
                "publish.id_pattern",
            ));
        }
        if self.media.frame_size == 0 {
            return Err(Error::config("frame size must be positive", "media.frame_size"));
        }
        if self.check_limit == 0 {
            return Err(Error::config("check limit must be positive", "check_limit"));
        }
        Ok(())
    }

    /// Fail unless credentials are available; only modes that log in call this
    pub fn require_credentials(&self) -> Result<()> {
        if self.source.credentials.is_complete() {
            Ok(())
        } else {
            Err(Error::config(
                format!("credentials missing: set {LOGIN_ENV} and {PASSWORD_ENV}"),
                "source.credentials",
            ))
        }
    }
}

/// Serialize `Duration` as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://sakurazaka46.com".to_string()
}

fn default_landing_path() -> String {
    "/s/s46/".to_string()
}

fn default_login_path() -> String {
    "/s/s46/login".to_string()
}

fn default_listing_path() -> String {
    "/s/s46/diary/radio?ima=0000".to_string()
}

fn default_detail_path_prefix() -> String {
    "/s/s46/diary/detail/".to_string()
}

fn default_session_cookie() -> String {
    "B81AC560F83BFC8C".to_string()
}

fn default_min_listing_bytes() -> usize {
    10_000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_6_2 like Mac OS X) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) CriOS/145.0.7632.108 Mobile/15E148 Safari/604.1"
        .to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_listing_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("sakuradio_state.json")
}

fn default_mapping_file() -> PathBuf {
    PathBuf::from("radio_mapping.json")
}

fn default_cover_dir() -> PathBuf {
    PathBuf::from("radio_cover")
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("radio_audio")
}

fn default_video_dir() -> PathBuf {
    PathBuf::from("radio_video")
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_encode_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_player_url_template() -> String {
    "https://players.brightcove.net/4504957038001/default_default/index.html?videoId={id}"
        .to_string()
}

fn default_audio_extensions() -> Vec<String> {
    ["m4a", "mp4", "aac", "webm"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_min_audio_bytes() -> u64 {
    100_000
}

fn default_min_video_bytes() -> u64 {
    1_000_000
}

fn default_cover_size_suffix() -> String {
    "/800_800_102400".to_string()
}

fn default_cover_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_frame_size() -> u32 {
    800
}

fn default_audio_bitrate() -> String {
    "192k".to_string()
}

fn default_title_template() -> String {
    "【桜坂46】桜耳通信 第{ep}回".to_string()
}

fn default_description_template() -> String {
    "桜耳通信 第{ep}回\n{summary}\n\n【桜坂46公式サイト】https://sakurazaka46.com\n※ファンによる非公式アーカイブです"
        .to_string()
}

fn default_tags() -> String {
    "櫻坂46,桜耳通信,さくみ耳,ラジオ,アーカイブ".to_string()
}

fn default_category() -> u32 {
    31
}

fn default_copyright() -> u8 {
    2
}

fn default_source_url() -> String {
    "https://sakurazaka46.com/s/s46/diary/radio".to_string()
}

fn default_placeholder_id() -> String {
    "success".to_string()
}

fn default_id_pattern() -> String {
    r"BV\w+".to_string()
}

fn default_check_limit() -> usize {
    5
}
