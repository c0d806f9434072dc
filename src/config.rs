//! Configuration file handling.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/ossaudit/config.toml`
//! - macOS: `~/Library/Application Support/ossaudit/config.toml`
//! - Windows: `%APPDATA%\ossaudit\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! cache_file = "/home/me/.cache/ossaudit/audit-cache.json"
//! cache_ttl_hours = 12
//! max_packages_per_batch = 128
//! api_url = "https://ossindex.sonatype.org/api/v3"
//! rate_limit_as_error = true
//! ignore = ["org.webjars.npm:jquery", "com.example:*"]
//!
//! [credentials]
//! username = "me@example.com"
//! token = "0123456789abcdef"
//!
//! [[exclusions]]
//! vid = "49da4413-af2b-4e55-acc0-9c752e30dde4"
//! packages = ["com.example:webapp", "org.webjars.npm:jquery"]
//! ```
//!
//! Setting `cache_file = ""` disables the persistent cache.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auditor::Exclusion;
use crate::lookup::{Credentials, DEFAULT_API_URL};
use crate::platform::default_cache_file;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache file shared by all runs. An empty path disables caching.
    ///
    /// Default: `<cache dir>/ossaudit/audit-cache.json`
    pub cache_file: Option<PathBuf>,

    /// How long cached reports stay valid, in hours.
    ///
    /// Default: 12 hours
    pub cache_ttl_hours: u64,

    /// Maximum number of coordinates per request.
    ///
    /// Default: 128
    pub max_packages_per_batch: usize,

    /// Base URL of the OSS Index REST API.
    pub api_url: String,

    /// Whether a 429 response fails the audit when credentials are configured.
    ///
    /// Without credentials rate limiting is always an error.
    /// Default: true
    pub rate_limit_as_error: bool,

    /// Artifacts that are not audited at all, as `group:name` or
    /// `group:name:version`. Supports `*` wildcards.
    pub ignore: Vec<String>,

    /// OSS Index account used to raise the rate limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    /// Vulnerability suppressions, optionally scoped to a dependency chain.
    pub exclusions: Vec<Exclusion>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_file: Some(default_cache_file()),
            cache_ttl_hours: 12,
            max_packages_per_batch: 128,
            api_url: DEFAULT_API_URL.to_string(),
            rate_limit_as_error: true,
            ignore: Vec::new(),
            credentials: None,
            exclusions: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_or_default(&Self::config_path())
    }

    /// Loads `path`, or the defaults when no file exists there. A file that
    /// exists but cannot be parsed is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ossaudit")
            .join("config.toml")
    }

    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// The cache file to use, or `None` when caching is disabled.
    pub fn cache_location(&self) -> Option<PathBuf> {
        self.cache_file
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Checks whether an artifact is on the ignore list, either as a whole
    /// (`group:name`) or in one version (`group:name:version`).
    pub fn is_ignored(&self, group: &str, name: &str, version: &str) -> bool {
        let artifact = format!("{}:{}", group, name);
        let versioned = format!("{}:{}", artifact, version);
        self.ignore
            .iter()
            .any(|pattern| glob_match(pattern, &artifact) || glob_match(pattern, &versioned))
    }
}

/// Simple glob matching (supports * as wildcard).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if text.len() < first.len() + last.len() || !text.starts_with(first) || !text.ends_with(last)
    {
        return false;
    }

    let mut remaining = &text[first.len()..text.len() - last.len()];
    for part in parts[1..parts.len() - 1].iter().filter(|p| !p.is_empty()) {
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("org.webjars.npm:jquery", "org.webjars.npm:jquery"));
        assert!(!glob_match("org.webjars.npm:jquery", "org.webjars.npm:jquery-ui"));
        assert!(glob_match("org.webjars.npm:*", "org.webjars.npm:jquery"));
        assert!(glob_match("*:jquery", "org.webjars.npm:jquery"));
        assert!(glob_match("org.*:jquery:*", "org.webjars.npm:jquery:1.2.3"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[test]
    fn test_is_ignored_whole_artifact_or_version() {
        let config = Config {
            ignore: vec![
                "org.webjars.npm:jquery".to_string(),
                "com.example:lib:1.0.0".to_string(),
                "com.internal:*".to_string(),
            ],
            ..Config::default()
        };

        assert!(config.is_ignored("org.webjars.npm", "jquery", "1.2.3"));
        assert!(config.is_ignored("com.example", "lib", "1.0.0"));
        assert!(!config.is_ignored("com.example", "lib", "1.0.1"));
        assert!(config.is_ignored("com.internal", "anything", "9"));
        assert!(!config.is_ignored("org.webjars.npm", "bootstrap", "3.3.7"));
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.cache_ttl_hours, 12);
        assert_eq!(config.max_packages_per_batch, 128);
        assert_eq!(config.api_url, "https://ossindex.sonatype.org/api/v3");
        assert!(config.rate_limit_as_error);
        assert!(config.credentials.is_none());
        assert!(config.exclusions.is_empty());
    }

    #[test]
    fn test_empty_cache_file_disables_cache() {
        let config: Config = toml::from_str("cache_file = \"\"").unwrap();
        assert!(config.cache_location().is_none());

        let config: Config = toml::from_str("cache_file = \"/tmp/cache.json\"").unwrap();
        assert_eq!(config.cache_location(), Some(PathBuf::from("/tmp/cache.json")));
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            cache_ttl_hours = 1
            rate_limit_as_error = false
            ignore = ["com.example:*"]

            [credentials]
            username = "me@example.com"
            token = "abc"

            [[exclusions]]
            vid = "49da4413-af2b-4e55-acc0-9c752e30dde4"
            packages = ["org.webjars.npm:jquery"]

            [[exclusions]]
            packages = ["com.example:legacy:2.0"]
            "#,
        )
        .unwrap();

        assert_eq!(config.cache_ttl_hours, 1);
        assert_eq!(config.max_packages_per_batch, 128);
        assert!(!config.rate_limit_as_error);
        assert_eq!(config.credentials.unwrap().username, "me@example.com");
        assert_eq!(config.exclusions.len(), 2);
        assert!(config.exclusions[1].vid.is_none());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = Config::generate_default_config();
        assert!(rendered.contains("cache_ttl_hours = 12"));
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.max_packages_per_batch, 128);
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.cache_ttl_hours, 12);

        fs::write(&path, "[credentials]\nusername = \"me\"\ntoken = ").unwrap();
        assert!(Config::load_or_default(&path).is_err());

        fs::write(&path, "cache_ttl_hours = 2").unwrap();
        assert_eq!(Config::load_or_default(&path).unwrap().cache_ttl_hours, 2);
    }

    #[test]
    fn test_load_from_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "cache_ttl_hours = \"soon\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }
}
