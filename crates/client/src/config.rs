// Local configuration for the replica client.
//
// Global config: `~/.strata/config.toml`
//
// The bearer credential never lives here; the session boundary supplies it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::live::ReconnectPolicy;
use crate::session::{derive_live_url, validate_base_url, validate_live_url};

/// Root directory for Strata client state: `~/.strata/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".strata"))
}

/// Path to the global config file: `~/.strata/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 500;

// ── Client config ──────────────────────────────────────────────────

/// Client configuration at `~/.strata/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// REST endpoint (e.g. `https://api.strata.dev`).
    pub base_url: String,
    /// Push endpoint. Derived from `base_url` when unset.
    pub live_url: Option<String>,
    /// Per-request timeout for REST calls.
    pub request_timeout_secs: u64,
    /// Event reconciliation windows.
    pub sync: SyncConfig,
    /// Document paging defaults.
    pub paging: PagingConfig,
    /// Push channel reconnect backoff.
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            live_url: None,
            request_timeout_secs: 10,
            sync: SyncConfig::default(),
            paging: PagingConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load from `~/.strata/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.strata/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Validated REST endpoint.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        validate_base_url(&self.base_url).map_err(ConfigError::Invalid)
    }

    /// Validated push endpoint, explicit or derived from `base_url`.
    pub fn live_url(&self) -> Result<Url, ConfigError> {
        let url = match &self.live_url {
            Some(explicit) => validate_live_url(explicit),
            None => derive_live_url(&self.base_url()?),
        };
        url.map_err(ConfigError::Invalid)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Dedup and notification windows for the event reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Window within which identical push events collapse (default 1000ms).
    pub dedup_window_ms: u64,
    /// Window within which identical notices collapse (default 500ms).
    pub notify_debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { dedup_window_ms: 1000, notify_debounce_ms: 500 }
    }
}

impl SyncConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn notify_debounce(&self) -> Duration {
        Duration::from_millis(self.notify_debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PagingConfig {
    pub page_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE }
    }
}

impl PagingConfig {
    /// Page size clamped to [1, 500].
    pub fn page_size(&self) -> u32 {
        clamp_page_size(self.page_size)
    }
}

pub(crate) fn clamp_page_size(size: u32) -> u32 {
    size.clamp(1, MAX_PAGE_SIZE)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Full jitter: each delay is drawn uniformly from `[0, backoff]`.
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { base_delay_ms: 250, max_delay_ms: 30_000, jitter: true }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
            jitter: self.jitter,
            ..ReconnectPolicy::default()
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
            Self::Invalid(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_windows() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.sync.dedup_window(), Duration::from_millis(1000));
        assert_eq!(cfg.sync.notify_debounce(), Duration::from_millis(500));
        assert_eq!(cfg.paging.page_size(), 50);
        assert_eq!(cfg.reconnect.base_delay_ms, 250);
        assert_eq!(cfg.reconnect.max_delay_ms, 30_000);
        assert!(cfg.reconnect.jitter);
        assert!(cfg.live_url.is_none());
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = ClientConfig {
            base_url: "https://api.example.com".into(),
            live_url: Some("wss://push.example.com/live".into()),
            request_timeout_secs: 3,
            sync: SyncConfig { dedup_window_ms: 2000, notify_debounce_ms: 250 },
            paging: PagingConfig { page_size: 25 },
            reconnect: ReconnectConfig { base_delay_ms: 100, max_delay_ms: 5000, jitter: false },
        };
        cfg.save_to(&path).unwrap();
        let loaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
base_url = "https://api.strata.dev"

[paging]
page_size = 20
"#;
        let cfg: ClientConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.base_url, "https://api.strata.dev");
        assert_eq!(cfg.paging.page_size(), 20);
        assert_eq!(cfg.sync, SyncConfig::default());
        assert_eq!(cfg.request_timeout_secs, 10);
    }

    #[test]
    fn empty_toml_is_default() {
        let cfg: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn load_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(ClientConfig::load_from(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("nested").join("config.toml");
        ClientConfig::default().save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(PagingConfig { page_size: 0 }.page_size(), 1);
        assert_eq!(PagingConfig { page_size: 10_000 }.page_size(), 500);
    }

    #[test]
    fn live_url_is_derived_from_base_url() {
        let cfg = ClientConfig { base_url: "https://api.strata.dev".into(), ..Default::default() };
        assert_eq!(cfg.live_url().unwrap().as_str(), "wss://api.strata.dev/v1/live");
    }

    #[test]
    fn explicit_live_url_wins() {
        let cfg = ClientConfig {
            base_url: "https://api.strata.dev".into(),
            live_url: Some("wss://push.strata.dev/events".into()),
            ..Default::default()
        };
        assert_eq!(cfg.live_url().unwrap().as_str(), "wss://push.strata.dev/events");
    }

    #[test]
    fn insecure_remote_base_url_is_rejected() {
        let cfg = ClientConfig { base_url: "http://api.strata.dev".into(), ..Default::default() };
        let error = cfg.base_url().unwrap_err();
        assert!(error.to_string().contains("must use https"));
    }

    #[test]
    fn reconnect_policy_never_caps_below_base() {
        let config = ReconnectConfig { base_delay_ms: 500, max_delay_ms: 100, jitter: false };
        let policy = config.policy();
        assert_eq!(policy.max_delay, Duration::from_millis(500));
    }

    #[test]
    fn global_dir_is_under_home() {
        let dir = global_dir().unwrap();
        assert!(dir.ends_with(".strata"));
    }
}
