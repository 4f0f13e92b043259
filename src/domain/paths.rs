//! Physical path and request descriptors shared by the cache, resolver and pipeline.

use std::fmt;
use std::path::Path;

/// On-disk location of a served file: the configured root joined with a normalized,
/// extension-resolved request path.
///
/// The resolver and the deploy pipeline build this the same way, so values produced by
/// one are valid cache keys for the other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalPath(String);

impl PhysicalPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Join a repository-relative path onto a root that ends with `/`.
    pub fn under_root(root: &str, relative: &str) -> Self {
        Self(format!("{root}{}", relative.trim_start_matches('/')))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// True when the path ends with `.<ext>`.
    pub fn has_extension(&self, ext: &str) -> bool {
        self.0
            .strip_suffix(ext)
            .is_some_and(|rest| rest.ends_with('.'))
    }
}

impl fmt::Display for PhysicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for PhysicalPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

/// The request facts a template and the render cache key are allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    /// Raw query string without the leading `?`; empty when absent.
    pub query: String,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, path: impl Into<String>, query: Option<&str>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: query.unwrap_or_default().to_string(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path, None)
    }
}
