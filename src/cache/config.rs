//! Cache configuration.
//!
//! Controls the path cache bound and mtime-driven invalidation via the `[cache]` section.

use std::num::NonZeroUsize;

const DEFAULT_PATH_CACHE_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum request-path → physical-path mappings kept before the oldest is dropped.
    pub path_cache_limit: usize,
    /// Stat templates on every load and invalidate them when their mtime advances.
    pub uncache_modified: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path_cache_limit: DEFAULT_PATH_CACHE_LIMIT,
            uncache_modified: false,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            path_cache_limit: settings.path_cache_limit.get(),
            uncache_modified: settings.uncache_modified,
        }
    }
}

impl CacheConfig {
    /// Returns the path cache limit as NonZeroUsize, clamping to 1 if zero.
    pub fn path_cache_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.path_cache_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.path_cache_limit, 100);
        assert!(!config.uncache_modified);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            path_cache_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.path_cache_limit_non_zero().get(), 1);
    }
}
