use std::path::PathBuf;

/// Get default cache directory following XDG conventions
///
/// - Linux/Unix: $XDG_CACHE_HOME/planstore or ~/.cache/planstore
/// - macOS: ~/Library/Caches/planstore
/// - Windows: %LOCALAPPDATA%/planstore
pub fn default_cache_dir() -> PathBuf {
    if let Some(cache_dir) = dirs::cache_dir() {
        cache_dir.join("planstore")
    } else {
        // Fallback to current directory if we can't determine cache dir
        PathBuf::from(".planstore/cache")
    }
}
