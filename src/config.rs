//! Run configuration: an optional TOML file, overridden by command-line flags.
//!
//! The config file is optional; a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted but logged as a warning,
//! since they are usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::content::{FetchLimits, DEFAULT_MAX_BYTES, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::enrich::DEFAULT_PARALLELISM;
use crate::util::HostPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Missing required setting `{0}`")]
    Missing(&'static str),

    #[error("Invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Settings for one run over a set of feed files.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Glob pattern identifying the feed files to process. Required.
    pub feeds: Option<String>,

    /// Directory for cached articles. No caching when unset.
    #[serde(alias = "cacheDir")]
    pub cache_dir: Option<PathBuf>,

    /// Rewrite feed files in place. When false, articles are still fetched
    /// and cached but the feeds are left untouched.
    pub write: bool,

    /// Milliseconds allowed for fetching one article.
    #[serde(alias = "fetchTimeout")]
    pub fetch_timeout: u64,

    /// Maximum size of a fetched page, in bytes.
    #[serde(alias = "fetchMaxSize")]
    pub fetch_max_size: u64,

    /// Number of articles fetched concurrently.
    pub parallelism: usize,

    /// User-Agent header sent with article requests.
    pub user_agent: String,

    /// Refuse links to localhost and private network addresses.
    pub block_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: None,
            cache_dir: None,
            write: false,
            fetch_timeout: DEFAULT_TIMEOUT.as_millis() as u64,
            fetch_max_size: DEFAULT_MAX_BYTES,
            parallelism: DEFAULT_PARALLELISM,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            block_private_hosts: true,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: &'static [&'static str] = &[
        "feeds",
        "cache_dir",
        "cacheDir",
        "write",
        "fetch_timeout",
        "fetchTimeout",
        "fetch_max_size",
        "fetchMaxSize",
        "parallelism",
        "user_agent",
        "block_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// The result is not validated; call [`Config::validate`] once command-line
    /// overrides have been applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check the size before reading so a huge file is never loaded
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Checks that the settings describe a runnable configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.feeds.as_deref() {
            None => return Err(ConfigError::Missing("feeds")),
            Some(pattern) if pattern.trim().is_empty() => {
                return Err(ConfigError::Invalid {
                    key: "feeds",
                    reason: "pattern is empty".to_string(),
                })
            }
            Some(_) => {}
        }
        if self.parallelism == 0 {
            return Err(ConfigError::Invalid {
                key: "parallelism",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.fetch_timeout == 0 {
            return Err(ConfigError::Invalid {
                key: "fetch_timeout",
                reason: "must be at least 1 millisecond".to_string(),
            });
        }
        if self.fetch_max_size == 0 {
            return Err(ConfigError::Invalid {
                key: "fetch_max_size",
                reason: "must be at least 1 byte".to_string(),
            });
        }
        Ok(())
    }

    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            max_bytes: self.fetch_max_size,
            timeout: Duration::from_millis(self.fetch_timeout),
        }
    }

    pub fn host_policy(&self) -> HostPolicy {
        if self.block_private_hosts {
            HostPolicy::PublicOnly
        } else {
            HostPolicy::AllowPrivate
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feeds, None);
        assert_eq!(config.cache_dir, None);
        assert!(!config.write);
        assert_eq!(config.fetch_timeout, 5000);
        assert_eq!(config.fetch_max_size, 5 * 1024 * 1024);
        assert_eq!(config.parallelism, 20);
        assert!(config.user_agent.starts_with("readable-feeds/"));
        assert!(config.block_private_hosts);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_and_whitespace_files_return_default() {
        for content in ["", "   \n  \n  "] {
            let (_dir, path) = write_config(content);
            assert_eq!(Config::load(&path).unwrap(), Config::default());
        }
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
feeds = "feeds/*.xml"
cache_dir = "/var/cache/readable-feeds"
write = true
fetch_timeout = 2500
fetch_max_size = 1048576
parallelism = 8
user_agent = "my-agent/1.0"
block_private_hosts = false
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feeds.as_deref(), Some("feeds/*.xml"));
        assert_eq!(
            config.cache_dir.as_deref(),
            Some(Path::new("/var/cache/readable-feeds"))
        );
        assert!(config.write);
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.user_agent, "my-agent/1.0");
        assert_eq!(
            config.fetch_limits(),
            FetchLimits {
                max_bytes: 1_048_576,
                timeout: Duration::from_millis(2500),
            }
        );
        assert_eq!(config.host_policy(), HostPolicy::AllowPrivate);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("feeds = \"*.rss\"\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feeds.as_deref(), Some("*.rss"));
        assert_eq!(config.parallelism, 20);
        assert_eq!(config.host_policy(), HostPolicy::PublicOnly);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (_dir, path) = write_config("parallelism = \"lots\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (_dir, path) = write_config("feeds = \"*.xml\"\nfetch_timout = 10\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.fetch_timeout, 5000);
    }

    #[test]
    fn test_camel_case_keys_recognized() {
        let (_dir, path) = write_config(
            "feeds = \"*.xml\"\ncacheDir = \"/var/cache/feeds\"\nfetchTimeout = 10\nfetchMaxSize = 2048\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/feeds")));
        assert_eq!(config.fetch_timeout, 10);
        assert_eq!(config.fetch_max_size, 2048);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_validate() {
        let valid = Config {
            feeds: Some("*.xml".to_string()),
            ..Config::default()
        };
        assert!(valid.validate().is_ok());

        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::Missing("feeds"))
        ));

        let zero_parallelism = Config {
            parallelism: 0,
            ..valid.clone()
        };
        assert!(matches!(
            zero_parallelism.validate(),
            Err(ConfigError::Invalid { key: "parallelism", .. })
        ));

        let zero_timeout = Config {
            fetch_timeout: 0,
            ..valid.clone()
        };
        assert!(matches!(
            zero_timeout.validate(),
            Err(ConfigError::Invalid { key: "fetch_timeout", .. })
        ));

        let blank = Config {
            feeds: Some("  ".to_string()),
            ..valid
        };
        assert!(matches!(
            blank.validate(),
            Err(ConfigError::Invalid { key: "feeds", .. })
        ));
    }
}
