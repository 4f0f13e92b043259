//! Pressbox cache system.
//!
//! Three cooperating stores, all keyed by [`PhysicalPath`](crate::domain::paths::PhysicalPath):
//!
//! - **Path cache**: request path → physical path, bounded, oldest-inserted eviction
//! - **Template cache**: compiled templates
//! - **Render cache**: captured template output, per path or per request
//!
//! [`SiteCache`] owns them and implements the invalidation protocol.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! path_cache_limit = 100
//! uncache_modified = false
//! ```

mod config;
mod controller;
mod keys;
mod lock;
mod store;

pub use config::CacheConfig;
pub use controller::{Invalidation, SiteCache};
pub use keys::RenderKey;
pub use store::{CacheMode, CachedRender, ModifiedTimes, PathStore, RenderStore, TemplateStore};
