//! Push-driven incremental deploys.
//!
//! A verified push is collapsed into a change set; each changed path is fetched (or
//! removed), compacted or minified by kind, written under the site root, and invalidated
//! in the site cache.

mod compact;
mod minify;
mod pipeline;
pub mod signature;
mod source;

pub use compact::{collapse_whitespace, compact_template};
pub use minify::{Minified, MinifyError, minify_script, minify_stylesheet};
pub use pipeline::{
    ApplyError, DeployError, DeployOutcome, DeployPipeline, PushDelivery, RestartReason,
};
pub use source::{ContentSource, FetchError};
