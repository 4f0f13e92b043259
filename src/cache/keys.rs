//! Render cache key definitions.

use std::fmt;

use crate::domain::paths::{PhysicalPath, RequestInfo};

/// Key of a render cache entry.
///
/// Persistent templates are cached once per physical path. Per-request templates are
/// cached separately for every method/query combination, and their bare path key holds a
/// marker instead of output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RenderKey {
    Path(PhysicalPath),
    Request {
        method: String,
        path: PhysicalPath,
        query: String,
    },
}

impl RenderKey {
    pub fn path_only(path: &PhysicalPath) -> Self {
        RenderKey::Path(path.clone())
    }

    pub fn per_request(path: &PhysicalPath, request: &RequestInfo) -> Self {
        RenderKey::Request {
            method: request.method.clone(),
            path: path.clone(),
            query: request.query.clone(),
        }
    }

    /// The physical path this key belongs to.
    pub fn path(&self) -> &PhysicalPath {
        match self {
            RenderKey::Path(path) | RenderKey::Request { path, .. } => path,
        }
    }

    pub fn is_per_request(&self) -> bool {
        matches!(self, RenderKey::Request { .. })
    }
}

impl fmt::Display for RenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderKey::Path(path) => write!(f, "{path}"),
            RenderKey::Request {
                method,
                path,
                query,
            } => write!(f, "{method} {path}?{query}"),
        }
    }
}
