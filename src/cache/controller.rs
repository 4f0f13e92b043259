//! The site cache: the three typed stores plus the invalidation protocol across them.

use std::time::SystemTime;

use metrics::counter;
use tracing::{debug, info};

use crate::domain::paths::PhysicalPath;

use super::config::CacheConfig;
use super::store::{ModifiedTimes, PathStore, RenderStore, TemplateStore};

/// What a single invalidation removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub path_entries: usize,
    pub template: bool,
    pub render_entries: usize,
}

impl Invalidation {
    pub fn is_empty(&self) -> bool {
        self.path_entries == 0 && !self.template && self.render_entries == 0
    }
}

/// Process-wide cache state shared by the resolver, the template engine and the deploy
/// pipeline.
pub struct SiteCache {
    config: CacheConfig,
    paths: PathStore,
    templates: TemplateStore,
    renders: RenderStore,
    modified: ModifiedTimes,
}

impl SiteCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            paths: PathStore::new(&config),
            templates: TemplateStore::new(),
            renders: RenderStore::new(),
            modified: ModifiedTimes::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn paths(&self) -> &PathStore {
        &self.paths
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn renders(&self) -> &RenderStore {
        &self.renders
    }

    /// Remove every entry derived from `path` across all three stores.
    ///
    /// Runs unconditionally, whether or not anything is cached. The store locks are held
    /// together (paths, then templates, then renders) so readers never observe a partial
    /// invalidation.
    pub fn invalidate(&self, path: &PhysicalPath) -> Invalidation {
        let mut paths = self.paths.lock("invalidate");
        let mut templates = self.templates.lock("invalidate");
        let mut renders = self.renders.lock("invalidate");

        let report = Invalidation {
            path_entries: paths.remove_targeting(path),
            template: templates.remove(path).is_some(),
            render_entries: renders.remove_path(path),
        };

        drop(renders);
        drop(templates);
        drop(paths);

        counter!("pressbox_cache_invalidate_total").increment(1);
        debug!(
            target = "pressbox::cache::controller",
            path = %path,
            path_entries = report.path_entries,
            template = report.template,
            render_entries = report.render_entries,
            "Invalidated cache entries"
        );
        report
    }

    /// Record the observed mtime of `path`, invalidating it when the time advanced.
    ///
    /// Returns the invalidation performed, if any.
    pub fn refresh_if_modified(
        &self,
        path: &PhysicalPath,
        modified: SystemTime,
    ) -> Option<Invalidation> {
        if !self.modified.observe(path, modified) {
            return None;
        }
        info!(
            target = "pressbox::cache::controller",
            path = %path,
            "Template changed on disk"
        );
        Some(self.invalidate(path))
    }
}
