//! Cross-platform path resolution.

use std::path::PathBuf;

/// Returns the cache directory for ossaudit.
///
/// Platform-specific locations:
/// - Linux: `~/.cache/ossaudit/`
/// - macOS: `~/Library/Caches/ossaudit/`
/// - Windows: `%LOCALAPPDATA%\ossaudit\`
///
/// Falls back to the system temp directory when no cache directory is known.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ossaudit")
}

/// Default location of the shared report cache.
pub fn default_cache_file() -> PathBuf {
    cache_dir().join("audit-cache.json")
}
