//! Request path → physical file resolution with directory index and extension fallback.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::cache::SiteCache;
use crate::config::SiteSettings;
use crate::domain::paths::PhysicalPath;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to inspect `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone)]
pub struct PathResolver {
    cache: Arc<SiteCache>,
    site: Arc<SiteSettings>,
}

impl PathResolver {
    pub fn new(cache: Arc<SiteCache>, site: Arc<SiteSettings>) -> Self {
        Self { cache, site }
    }

    pub fn site(&self) -> &SiteSettings {
        &self.site
    }

    /// Map a root-relative request path to the file that should answer it.
    ///
    /// Extensionless paths probe `<p>.<template_ext>`, `<p>.html` and `<p>.htm` in that
    /// order; directories probe `<p>/<index>.*` and otherwise fall back to
    /// `<p>/<index>.<template_ext>`, which need not exist. Results are cached until the
    /// target is invalidated or evicted.
    pub async fn resolve(&self, request: &str) -> Result<PhysicalPath, ResolveError> {
        if let Some(hit) = self.cache.paths().get(request) {
            debug!(
                target = "pressbox::application::resolve",
                request,
                physical = %hit,
                "Path cache hit"
            );
            return Ok(hit);
        }

        let resolved = self.probe(request).await?;

        if let Some(evicted) = self.cache.paths().insert(request.to_string(), resolved.clone()) {
            debug!(
                target = "pressbox::application::resolve",
                evicted,
                "Path cache full; dropped oldest entry"
            );
        }
        debug!(
            target = "pressbox::application::resolve",
            request,
            physical = %resolved,
            "Resolved request path"
        );
        Ok(resolved)
    }

    async fn probe(&self, request: &str) -> Result<PhysicalPath, ResolveError> {
        let ext = &self.site.template_ext;
        let mut output = format!("{}{}", self.site.root, normalize(request));

        if !looks_extensionless(&output) {
            return Ok(PhysicalPath::new(output));
        }

        let mut stem = String::new();
        let metadata = fs::metadata(&output).await;
        let is_dir = match metadata {
            Ok(meta) => meta.is_dir(),
            Err(err) if is_absent(&err) => false,
            Err(source) => return Err(ResolveError::Io { path: output, source }),
        };
        if is_dir {
            if !output.ends_with('/') {
                output.push('/');
            }
            stem.push_str(&self.site.index_name);
        }

        let base = format!("{output}{stem}");
        let candidates = [
            (format!("{base}.{ext}"), Probe::File),
            (format!("{base}.html"), Probe::File),
            (format!("{base}.htm"), Probe::NotDirectory),
        ];
        for (candidate, probe) in candidates {
            if probe.matches(&candidate).await? {
                return Ok(PhysicalPath::new(candidate));
            }
        }

        if is_dir {
            return Ok(PhysicalPath::new(format!("{base}.{ext}")));
        }
        Ok(PhysicalPath::new(output))
    }
}

#[derive(Clone, Copy)]
enum Probe {
    File,
    /// Accepts anything that exists but is not a directory.
    NotDirectory,
}

impl Probe {
    async fn matches(self, candidate: &str) -> Result<bool, ResolveError> {
        match fs::metadata(candidate).await {
            Ok(meta) => Ok(match self {
                Probe::File => meta.is_file(),
                Probe::NotDirectory => !meta.is_dir(),
            }),
            Err(err) if is_absent(&err) => Ok(false),
            Err(source) => Err(ResolveError::Io {
                path: candidate.to_string(),
                source,
            }),
        }
    }
}

fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Collapse separators and drop `.`/`..` segments so a request cannot leave the root.
///
/// A trailing separator is kept so `/blog/` and `/blog` stay distinct cache keys with the
/// same target.
pub(crate) fn normalize(request: &str) -> String {
    let segments: Vec<&str> = request
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect();
    let mut normalized = segments.join("/");
    if !normalized.is_empty() && request.ends_with(['/', '\\']) {
        normalized.push('/');
    }
    normalized
}

/// True when the final path segment has no `.`.
fn looks_extensionless(path: &str) -> bool {
    match (path.rfind('/'), path.rfind('.')) {
        (Some(slash), Some(dot)) => slash > dot,
        (_, None) => true,
        (None, Some(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::fs as std_fs;

    use tempfile::TempDir;

    use super::*;
    use crate::cache::CacheConfig;

    fn resolver(dir: &TempDir, limit: usize) -> PathResolver {
        let cache = Arc::new(SiteCache::new(CacheConfig {
            path_cache_limit: limit,
            ..CacheConfig::default()
        }));
        PathResolver::new(cache, Arc::new(SiteSettings::rooted_at(dir.path())))
    }

    fn touch(dir: &TempDir, relative: &str) {
        let path = dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std_fs::create_dir_all(parent).expect("create parent");
        }
        std_fs::write(path, b"x").expect("write file");
    }

    fn root(dir: &TempDir) -> String {
        SiteSettings::rooted_at(dir.path()).root
    }

    #[test]
    fn normalize_strips_traversal_and_duplicate_separators() {
        assert_eq!(normalize("/www//a/./b/../c"), "www/a/b/c");
        assert_eq!(normalize("\\www\\blog\\"), "www/blog/");
        assert_eq!(normalize("/"), "");
        assert_eq!(normalize("../../etc/passwd"), "etc/passwd");
    }

    #[test]
    fn extensionless_detection_uses_final_segment() {
        assert!(looks_extensionless("/srv/v1.2/about"));
        assert!(looks_extensionless("/srv/www/"));
        assert!(!looks_extensionless("/srv/www/style.css"));
    }

    #[tokio::test]
    async fn template_wins_over_html() {
        let dir = TempDir::new().expect("tempdir");
        touch(&dir, "www/about.tera");
        touch(&dir, "www/about.html");

        let resolved = resolver(&dir, 10).resolve("www/about").await.expect("resolve");

        assert_eq!(resolved.as_str(), format!("{}www/about.tera", root(&dir)));
    }

    #[tokio::test]
    async fn html_then_htm_fallbacks() {
        let dir = TempDir::new().expect("tempdir");
        touch(&dir, "www/a.html");
        touch(&dir, "www/b.htm");
        let resolver = resolver(&dir, 10);

        let a = resolver.resolve("www/a").await.expect("resolve a");
        let b = resolver.resolve("www/b").await.expect("resolve b");

        assert!(a.as_str().ends_with("www/a.html"));
        assert!(b.as_str().ends_with("www/b.htm"));
    }

    #[tokio::test]
    async fn directory_uses_index_then_deferred_template() {
        let dir = TempDir::new().expect("tempdir");
        touch(&dir, "www/blog/index.html");
        std_fs::create_dir_all(dir.path().join("www/empty")).expect("mkdir");
        let resolver = resolver(&dir, 10);

        let blog = resolver.resolve("www/blog").await.expect("resolve blog");
        let empty = resolver.resolve("www/empty/").await.expect("resolve empty");

        assert_eq!(blog.as_str(), format!("{}www/blog/index.html", root(&dir)));
        assert_eq!(empty.as_str(), format!("{}www/empty/index.tera", root(&dir)));
    }

    #[tokio::test]
    async fn missing_extensionless_path_resolves_to_itself() {
        let dir = TempDir::new().expect("tempdir");

        let resolved = resolver(&dir, 10).resolve("www/nope").await.expect("resolve");

        assert_eq!(resolved.as_str(), format!("{}www/nope", root(&dir)));
    }

    #[tokio::test]
    async fn paths_with_extensions_are_not_probed() {
        let dir = TempDir::new().expect("tempdir");

        let resolved = resolver(&dir, 10)
            .resolve("www/style.css")
            .await
            .expect("resolve");

        assert_eq!(resolved.as_str(), format!("{}www/style.css", root(&dir)));
    }

    #[tokio::test]
    async fn second_resolve_is_served_from_cache() {
        let dir = TempDir::new().expect("tempdir");
        touch(&dir, "www/about.html");
        let resolver = resolver(&dir, 10);

        let first = resolver.resolve("www/about").await.expect("first");
        // A filesystem change without invalidation is not observed.
        touch(&dir, "www/about.tera");
        let second = resolver.resolve("www/about").await.expect("second");

        assert_eq!(first, second);
        assert!(second.as_str().ends_with("about.html"));
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_probe() {
        let dir = TempDir::new().expect("tempdir");
        touch(&dir, "www/about.html");
        let resolver = resolver(&dir, 10);

        let first = resolver.resolve("www/about").await.expect("first");
        touch(&dir, "www/about.tera");
        resolver.cache.invalidate(&first);
        let second = resolver.resolve("www/about").await.expect("second");

        assert!(second.as_str().ends_with("about.tera"));
    }

    #[tokio::test]
    async fn full_cache_drops_oldest_request() {
        let dir = TempDir::new().expect("tempdir");
        let resolver = resolver(&dir, 2);

        for request in ["www/a.css", "www/b.css", "www/c.css"] {
            resolver.resolve(request).await.expect("resolve");
        }

        let paths = resolver.cache.paths();
        assert_eq!(paths.len(), 2);
        assert!(!paths.contains("www/a.css"));
        assert!(paths.contains("www/b.css"));
        assert!(paths.contains("www/c.css"));
    }
}
