//! Cache storage implementations.
//!
//! - `PathStore`: request path → physical path, bounded, oldest-inserted eviction.
//! - `TemplateStore`: physical path → compiled template, unbounded.
//! - `RenderStore`: render key → captured template output.
//! - `ModifiedTimes`: physical path → last observed mtime.
//!
//! Every operation is synchronous; callers never hold a guard across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::SystemTime;

use lru::LruCache;
use metrics::counter;
use serde_json::{Map, Value};

use crate::application::render::CompiledTemplate;
use crate::domain::paths::{PhysicalPath, RequestInfo};

use super::config::CacheConfig;
use super::keys::RenderKey;
use super::lock::{rw_read, rw_write};

// ============================================================================
// Path Store
// ============================================================================

/// Request path → physical path mappings.
///
/// Backed by an `LruCache` that is only ever read with `peek`, so recency never changes
/// after insertion and the evicted entry is always the oldest-inserted one.
pub struct PathStore {
    entries: RwLock<PathEntries>,
}

pub(crate) struct PathEntries {
    map: LruCache<String, PhysicalPath>,
}

impl PathEntries {
    /// Drop every mapping that points at `physical`. Returns how many were removed.
    pub(crate) fn remove_targeting(&mut self, physical: &PhysicalPath) -> usize {
        let stale: Vec<String> = self
            .map
            .iter()
            .filter(|(_, target)| *target == physical)
            .map(|(request, _)| request.clone())
            .collect();
        for request in &stale {
            self.map.pop(request);
        }
        stale.len()
    }
}

impl PathStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(PathEntries {
                map: LruCache::new(config.path_cache_limit_non_zero()),
            }),
        }
    }

    pub fn get(&self, request: &str) -> Option<PhysicalPath> {
        let found = rw_read(&self.entries, "paths", "get")
            .map
            .peek(request)
            .cloned();
        match found {
            Some(_) => counter!("pressbox_path_cache_hit_total").increment(1),
            None => counter!("pressbox_path_cache_miss_total").increment(1),
        }
        found
    }

    /// Insert a mapping. Returns the request path evicted to make room, if any.
    ///
    /// Re-inserting an existing request path updates it in place without moving it in
    /// the eviction order.
    pub fn insert(&self, request: String, physical: PhysicalPath) -> Option<String> {
        let mut entries = rw_write(&self.entries, "paths", "insert");
        if let Some(slot) = entries.map.peek_mut(&request) {
            *slot = physical;
            return None;
        }
        let evicted = entries.map.push(request, physical).map(|(key, _)| key);
        if evicted.is_some() {
            counter!("pressbox_path_cache_evict_total").increment(1);
        }
        evicted
    }

    pub fn contains(&self, request: &str) -> bool {
        rw_read(&self.entries, "paths", "contains")
            .map
            .contains(request)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, "paths", "len").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock(&self, op: &'static str) -> RwLockWriteGuard<'_, PathEntries> {
        rw_write(&self.entries, "paths", op)
    }
}

// ============================================================================
// Template Store
// ============================================================================

/// Compiled templates keyed by physical path. Entries live until invalidated.
#[derive(Default)]
pub struct TemplateStore {
    entries: RwLock<HashMap<PhysicalPath, Arc<dyn CompiledTemplate>>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &PhysicalPath) -> Option<Arc<dyn CompiledTemplate>> {
        rw_read(&self.entries, "templates", "get").get(path).cloned()
    }

    pub fn insert(&self, path: PhysicalPath, template: Arc<dyn CompiledTemplate>) {
        rw_write(&self.entries, "templates", "insert").insert(path, template);
    }

    pub fn contains(&self, path: &PhysicalPath) -> bool {
        rw_read(&self.entries, "templates", "contains").contains_key(path)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, "templates", "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock(
        &self,
        op: &'static str,
    ) -> RwLockWriteGuard<'_, HashMap<PhysicalPath, Arc<dyn CompiledTemplate>>> {
        rw_write(&self.entries, "templates", op)
    }
}

// ============================================================================
// Render Store
// ============================================================================

/// What a template left behind when it signalled completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedRender {
    pub value: String,
    pub status: Option<u16>,
    /// Header name → value; `None` or empty values are skipped when writing the response.
    pub headers: BTreeMap<String, Option<String>>,
    pub redirect: Option<String>,
    pub fields: Map<String, Value>,
}

/// Caching mode requested by a template through its `cache` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Off,
    /// Cache once per physical path.
    Persistent,
    /// Cache per method, physical path and query string.
    PerRequest,
}

#[derive(Debug, Clone)]
enum RenderEntry {
    /// Stored under the bare path key of a per-request template.
    PerRequestMarker,
    Output(Arc<CachedRender>),
}

#[derive(Default)]
pub struct RenderStore {
    entries: RwLock<HashMap<RenderKey, RenderEntry>>,
}

pub(crate) struct RenderEntries<'a> {
    guard: RwLockWriteGuard<'a, HashMap<RenderKey, RenderEntry>>,
}

impl RenderEntries<'_> {
    /// Remove everything cached for `path`. Returns the number of keys removed.
    pub(crate) fn remove_path(&mut self, path: &PhysicalPath) -> usize {
        let bare = RenderKey::path_only(path);
        let before = self.guard.len();
        if matches!(self.guard.get(&bare), Some(RenderEntry::PerRequestMarker)) {
            self.guard
                .retain(|key, _| !(key.is_per_request() && key.path() == path));
        }
        self.guard.remove(&bare);
        before - self.guard.len()
    }
}

impl RenderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key under which output for this request is looked up and stored.
    pub fn key_for(&self, path: &PhysicalPath, request: &RequestInfo) -> RenderKey {
        let bare = RenderKey::path_only(path);
        let per_request = matches!(
            rw_read(&self.entries, "renders", "key_for").get(&bare),
            Some(RenderEntry::PerRequestMarker)
        );
        if per_request {
            RenderKey::per_request(path, request)
        } else {
            bare
        }
    }

    pub fn get(&self, key: &RenderKey) -> Option<Arc<CachedRender>> {
        let found = match rw_read(&self.entries, "renders", "get").get(key) {
            Some(RenderEntry::Output(render)) => Some(Arc::clone(render)),
            _ => None,
        };
        match found {
            Some(_) => counter!("pressbox_render_cache_hit_total").increment(1),
            None => counter!("pressbox_render_cache_miss_total").increment(1),
        }
        found
    }

    /// Store output according to `mode`, returning the key it was stored under.
    ///
    /// `lookup` is the key computed before execution. Per-request output marks the
    /// path first and is then stored under the compound key for `request`.
    pub fn store(
        &self,
        lookup: &RenderKey,
        request: &RequestInfo,
        mode: CacheMode,
        render: CachedRender,
    ) -> Option<RenderKey> {
        let mut entries = rw_write(&self.entries, "renders", "store");
        let key = match mode {
            CacheMode::Off => return None,
            CacheMode::Persistent => lookup.clone(),
            CacheMode::PerRequest => {
                let path = lookup.path();
                entries.insert(RenderKey::path_only(path), RenderEntry::PerRequestMarker);
                RenderKey::per_request(path, request)
            }
        };
        entries.insert(key.clone(), RenderEntry::Output(Arc::new(render)));
        Some(key)
    }

    pub fn is_per_request(&self, path: &PhysicalPath) -> bool {
        matches!(
            rw_read(&self.entries, "renders", "is_per_request").get(&RenderKey::path_only(path)),
            Some(RenderEntry::PerRequestMarker)
        )
    }

    pub fn contains(&self, key: &RenderKey) -> bool {
        rw_read(&self.entries, "renders", "contains").contains_key(key)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, "renders", "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock(&self, op: &'static str) -> RenderEntries<'_> {
        RenderEntries {
            guard: rw_write(&self.entries, "renders", op),
        }
    }
}

// ============================================================================
// Modification times
// ============================================================================

#[derive(Default)]
pub struct ModifiedTimes {
    entries: RwLock<HashMap<PhysicalPath, SystemTime>>,
}

impl ModifiedTimes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `modified` for `path`; returns true when it is newer than the previous record.
    pub fn observe(&self, path: &PhysicalPath, modified: SystemTime) -> bool {
        let mut entries = rw_write(&self.entries, "modified", "observe");
        let advanced = entries
            .get(path)
            .is_some_and(|previous| modified > *previous);
        entries.insert(path.clone(), modified);
        advanced
    }

    pub fn get(&self, path: &PhysicalPath) -> Option<SystemTime> {
        rw_read(&self.entries, "modified", "get").get(path).copied()
    }
}
