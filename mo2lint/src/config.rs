//! User configuration and well-known locations.
//!
//! Settings live in `<config dir>/mo2-lint/config.ini`:
//!
//! ```ini
//! [downloads]
//! attempts = 3
//! backoff = none          ; none | fixed | exponential
//! backoff_ms = 1000
//! timeout_secs = 300
//!
//! [paths]
//! cache_dir = /path/to/cache
//!
//! [mod_organizer]
//! url = https://github.com/ModOrganizer2/modorganizer/releases/download/v2.5.2/Mod.Organizer-2.5.2.7z
//! checksum = <sha256>
//!
//! [redirector]
//! payload = /path/to/redirector.exe
//! ```
//!
//! A missing file means defaults. Unknown keys are ignored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::fetch::{Backoff, RetryPolicy, DEFAULT_ATTEMPTS, DEFAULT_TIMEOUT_SECS};

/// Application directory name under the platform config and cache dirs.
pub const APP_DIR: &str = "mo2-lint";

const CONFIG_FILE: &str = "config.ini";
const REGISTRY_FILE: &str = "instance_state.json";

/// Cap for exponential backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Errors raised while reading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Path of the user configuration file.
pub fn config_file_path() -> PathBuf {
    config_root().join(CONFIG_FILE)
}

fn config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Well-known files and directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for AppPaths {
    fn default() -> Self {
        Self {
            config_dir: config_root(),
            cache_dir: cache_root(),
        }
    }
}

impl AppPaths {
    /// Paths rooted at explicit directories.
    pub fn new(config_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Default paths with the cache relocated as configured.
    pub fn from_config(config: &ConfigFile) -> Self {
        let mut paths = Self::default();
        if let Some(cache) = &config.paths.cache_dir {
            paths.cache_dir = cache.clone();
        }
        paths
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// The instance registry document.
    pub fn registry_file(&self) -> PathBuf {
        self.config_dir.join(REGISTRY_FILE)
    }

    /// Directory of per-index instance links.
    pub fn links_dir(&self) -> PathBuf {
        self.config_dir.join("instances")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    /// Where archives are expanded before installation.
    pub fn extracted_dir(&self) -> PathBuf {
        self.downloads_dir().join("extracted")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.cache_dir.join("logs")
    }
}

/// Backoff curve name as written in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackoffKind {
    #[default]
    None,
    Fixed,
    Exponential,
}

impl BackoffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
        }
    }
}

impl FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("expected none, fixed or exponential, got {}", other)),
        }
    }
}

/// `[downloads]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub attempts: u32,
    pub backoff: BackoffKind,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: BackoffKind::None,
            backoff_ms: 1000,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl DownloadSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.backoff_ms);
        let backoff = match self.backoff {
            BackoffKind::None => Backoff::None,
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                max: MAX_BACKOFF,
            },
        };
        RetryPolicy::new(self.attempts).with_backoff(backoff)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[paths]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSettings {
    pub cache_dir: Option<PathBuf>,
}

/// `[mod_organizer]`: the release archive `update` installs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModOrganizerSettings {
    pub url: Option<String>,
    /// Expected SHA-256 of the archive.
    pub checksum: Option<String>,
}

/// `[redirector]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectorSettings {
    pub payload: Option<PathBuf>,
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub downloads: DownloadSettings,
    pub paths: PathSettings,
    pub mod_organizer: ModOrganizerSettings,
    pub redirector: RedirectorSettings,
}

impl ConfigFile {
    /// Load the user configuration file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|s| s.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }

        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save to the user configuration file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }

        ini.write_to_file(path).map_err(write_err)
    }
}

/// A settable `section.key` of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DownloadsAttempts,
    DownloadsBackoff,
    DownloadsBackoffMs,
    DownloadsTimeoutSecs,
    PathsCacheDir,
    ModOrganizerUrl,
    ModOrganizerChecksum,
    RedirectorPayload,
}

impl ConfigKey {
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::DownloadsAttempts,
            Self::DownloadsBackoff,
            Self::DownloadsBackoffMs,
            Self::DownloadsTimeoutSecs,
            Self::PathsCacheDir,
            Self::ModOrganizerUrl,
            Self::ModOrganizerChecksum,
            Self::RedirectorPayload,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            Self::DownloadsAttempts
            | Self::DownloadsBackoff
            | Self::DownloadsBackoffMs
            | Self::DownloadsTimeoutSecs => "downloads",
            Self::PathsCacheDir => "paths",
            Self::ModOrganizerUrl | Self::ModOrganizerChecksum => "mod_organizer",
            Self::RedirectorPayload => "redirector",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Self::DownloadsAttempts => "attempts",
            Self::DownloadsBackoff => "backoff",
            Self::DownloadsBackoffMs => "backoff_ms",
            Self::DownloadsTimeoutSecs => "timeout_secs",
            Self::PathsCacheDir => "cache_dir",
            Self::ModOrganizerUrl => "url",
            Self::ModOrganizerChecksum => "checksum",
            Self::RedirectorPayload => "payload",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        let path_text = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };

        match self {
            Self::DownloadsAttempts => config.downloads.attempts.to_string(),
            Self::DownloadsBackoff => config.downloads.backoff.as_str().to_string(),
            Self::DownloadsBackoffMs => config.downloads.backoff_ms.to_string(),
            Self::DownloadsTimeoutSecs => config.downloads.timeout_secs.to_string(),
            Self::PathsCacheDir => path_text(&config.paths.cache_dir),
            Self::ModOrganizerUrl => config.mod_organizer.url.clone().unwrap_or_default(),
            Self::ModOrganizerChecksum => {
                config.mod_organizer.checksum.clone().unwrap_or_default()
            }
            Self::RedirectorPayload => path_text(&config.redirector.payload),
        }
    }

    /// Parse and store `value`. An empty value clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason,
        };
        let number = |min: u64| -> Result<u64, ConfigError> {
            let n: u64 = value.parse().map_err(|_| invalid("expected a number".into()))?;
            if n < min {
                return Err(invalid(format!("must be at least {}", min)));
            }
            Ok(n)
        };
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());

        match self {
            Self::DownloadsAttempts => {
                config.downloads.attempts = u32::try_from(number(1)?)
                    .map_err(|_| invalid("too large".into()))?;
            }
            Self::DownloadsBackoff => config.downloads.backoff = value.parse().map_err(invalid)?,
            Self::DownloadsBackoffMs => config.downloads.backoff_ms = number(0)?,
            Self::DownloadsTimeoutSecs => config.downloads.timeout_secs = number(1)?,
            Self::PathsCacheDir => config.paths.cache_dir = optional(value).map(PathBuf::from),
            Self::ModOrganizerUrl => config.mod_organizer.url = optional(value),
            Self::ModOrganizerChecksum => {
                if !value.is_empty() && !is_sha256_hex(value) {
                    return Err(invalid("expected 64 hex digits".into()));
                }
                config.mod_organizer.checksum = optional(value.to_lowercase().as_str())
            }
            Self::RedirectorPayload => {
                config.redirector.payload = optional(value).map(PathBuf::from)
            }
        }
        Ok(())
    }
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("config.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.downloads.attempts, 3);
    }

    #[test]
    fn test_load_sections() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(
            &path,
            "[downloads]\nattempts = 5\nbackoff = exponential\nbackoff_ms = 250\n\n\
             [mod_organizer]\nurl = https://example.com/mo2.7z\n\n[unrelated]\nfoo = bar\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();

        assert_eq!(config.downloads.attempts, 5);
        assert_eq!(config.downloads.backoff, BackoffKind::Exponential);
        assert_eq!(
            config.mod_organizer.url.as_deref(),
            Some("https://example.com/mo2.7z")
        );
        assert_eq!(config.downloads.timeout_secs, DEFAULT_TIMEOUT_SECS);

        let policy = config.downloads.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                base: Duration::from_millis(250),
                max: MAX_BACKOFF
            }
        );
    }

    #[test]
    fn test_invalid_value_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[downloads]\nattempts = zero\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.ini");
        let mut config = ConfigFile::default();
        ConfigKey::PathsCacheDir.set(&mut config, "/data/cache").unwrap();
        ConfigKey::RedirectorPayload.set(&mut config, "/opt/redirector.exe").unwrap();
        ConfigKey::DownloadsBackoff.set(&mut config, "fixed").unwrap();

        config.save_to(&path).unwrap();
        let reloaded = ConfigFile::load_from(&path).unwrap();

        assert_eq!(reloaded, config);
        assert!(fs::read_to_string(&path).unwrap().contains("[redirector]"));
    }

    #[test]
    fn test_config_key_parse_and_name() {
        let key: ConfigKey = "mod_organizer.url".parse().unwrap();
        assert_eq!(key, ConfigKey::ModOrganizerUrl);
        assert_eq!(key.name(), "mod_organizer.url");
        assert_eq!(key.to_string(), "mod_organizer.url");
        assert!("nexus.api_key".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_config_key_set_clears_optional() {
        let mut config = ConfigFile::default();
        ConfigKey::ModOrganizerUrl.set(&mut config, "https://x/mo2.7z").unwrap();
        assert_eq!(ConfigKey::ModOrganizerUrl.get(&config), "https://x/mo2.7z");
        ConfigKey::ModOrganizerUrl.set(&mut config, "").unwrap();
        assert_eq!(config.mod_organizer.url, None);
    }

    #[test]
    fn test_checksum_must_be_sha256() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::ModOrganizerChecksum.set(&mut config, "abc").is_err());

        let digest = "AB".repeat(32);
        ConfigKey::ModOrganizerChecksum.set(&mut config, &digest).unwrap();
        assert_eq!(config.mod_organizer.checksum, Some("ab".repeat(32)));
    }

    #[test]
    fn test_attempts_must_be_positive() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::DownloadsAttempts.set(&mut config, "0").is_err());
        assert!(ConfigKey::DownloadsBackoff.set(&mut config, "linear").is_err());
    }

    #[test]
    fn test_app_paths_layout() {
        let paths = AppPaths::new("/cfg/mo2-lint", "/cache/mo2-lint");
        assert_eq!(paths.registry_file(), PathBuf::from("/cfg/mo2-lint/instance_state.json"));
        assert_eq!(paths.links_dir(), PathBuf::from("/cfg/mo2-lint/instances"));
        assert_eq!(
            paths.extracted_dir(),
            PathBuf::from("/cache/mo2-lint/downloads/extracted")
        );

        let mut config = ConfigFile::default();
        config.paths.cache_dir = Some(PathBuf::from("/big/disk"));
        assert_eq!(AppPaths::from_config(&config).cache_dir, PathBuf::from("/big/disk"));
    }
}
